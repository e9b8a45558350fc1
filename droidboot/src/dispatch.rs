// Licensed under the Apache-2.0 license

//! Named command table.
//!
//! Commands live in two namespaces, `flash <target>` and
//! `maintenance <command>`. Handlers run synchronously and their reply or
//! error is passed back unchanged.

use crate::error::{ErrorKind, FlashError, FlashResult};
use core::fmt;
use log::{debug, info};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Namespace {
    Flash,
    Maintenance,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Flash => "flash",
            Namespace::Maintenance => "maintenance",
        }
    }
}

/// A parsed `"<namespace> <command>"` name.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommandName {
    namespace: Namespace,
    command: String,
}

impl CommandName {
    pub fn new(namespace: Namespace, command: &str) -> FlashResult<Self> {
        if command.is_empty() || command.chars().any(char::is_whitespace) {
            return Err(FlashError::invalid_argument(format!("malformed command '{command}'")));
        }
        Ok(Self {
            namespace,
            command: command.to_string(),
        })
    }

    pub fn parse(name: &str) -> FlashResult<Self> {
        let (ns, command) = name.split_once(' ').ok_or_else(|| {
            FlashError::invalid_argument(format!("malformed command name '{name}'"))
        })?;
        let namespace = match ns {
            "flash" => Namespace::Flash,
            "maintenance" => Namespace::Maintenance,
            _ => {
                return Err(FlashError::invalid_argument(format!(
                    "unknown command namespace '{ns}'"
                )))
            }
        };
        Self::new(namespace, command)
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.namespace.as_str(), self.command)
    }
}

/// Input of one invocation: image bytes for flash commands, string
/// arguments for maintenance commands.
#[derive(Clone, Copy, Debug, Default)]
pub struct Request<'a> {
    pub payload: &'a [u8],
    pub args: &'a [&'a str],
}

impl<'a> Request<'a> {
    pub fn payload(payload: &'a [u8]) -> Self {
        Self { payload, args: &[] }
    }

    pub fn args(args: &'a [&'a str]) -> Self {
        Self { payload: &[], args }
    }
}

/// Successful outcome of a handler.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reply {
    pub message: Option<String>,
}

impl Reply {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }
}

pub type Handler<C> = Box<dyn Fn(&mut C, &Request<'_>) -> FlashResult<Reply>>;

/// Command table over a handler context `C`.
pub struct CommandRegistry<C> {
    handlers: BTreeMap<CommandName, Handler<C>>,
}

impl<C> Default for CommandRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> CommandRegistry<C> {
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// Adds `handler` under `name`. An existing entry is never replaced.
    pub fn register<F>(&mut self, name: &str, handler: F) -> FlashResult<()>
    where
        F: Fn(&mut C, &Request<'_>) -> FlashResult<Reply> + 'static,
    {
        let name = CommandName::parse(name)?;
        if self.handlers.contains_key(&name) {
            return Err(FlashError::new(
                ErrorKind::DuplicateCommand,
                format!("'{name}' is already registered"),
            ));
        }
        debug!("Registered '{name}'");
        self.handlers.insert(name, Box::new(handler));
        Ok(())
    }

    pub fn dispatch(&self, name: &str, ctx: &mut C, request: &Request<'_>) -> FlashResult<Reply> {
        let handler = CommandName::parse(name)
            .ok()
            .and_then(|parsed| self.handlers.get(&parsed))
            .ok_or_else(|| {
                FlashError::new(
                    ErrorKind::UnknownCommand,
                    format!("unknown command '{name}'"),
                )
            })?;
        info!("CMD '{name}'");
        handler(ctx, request)
    }

    pub fn contains(&self, name: &str) -> bool {
        CommandName::parse(name)
            .map(|parsed| self.handlers.contains_key(&parsed))
            .unwrap_or(false)
    }

    pub fn names(&self) -> impl Iterator<Item = &CommandName> {
        self.handlers.keys()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
