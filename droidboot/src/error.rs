// Licensed under the Apache-2.0 license

use crate::storage::StorageError;
use core::fmt;
use fw_version::VersionError;
use osip::OsipError;
use thiserror::Error;

/// Classification of every failure the engine reports. All of them end the
/// operation that raised them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    CorruptIndex,
    NotFound,
    OversizeImage,
    ParseError,
    PrerequisiteMissing,
    IncompatibleVersion,
    DuplicateCommand,
    UnknownCommand,
    IoFailure,
    InvalidArgument,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::CorruptIndex => "corrupt index",
            ErrorKind::NotFound => "not found",
            ErrorKind::OversizeImage => "oversize image",
            ErrorKind::ParseError => "parse error",
            ErrorKind::PrerequisiteMissing => "prerequisite missing",
            ErrorKind::IncompatibleVersion => "incompatible version",
            ErrorKind::DuplicateCommand => "duplicate command",
            ErrorKind::UnknownCommand => "unknown command",
            ErrorKind::IoFailure => "I/O failure",
            ErrorKind::InvalidArgument => "invalid argument",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct FlashError {
    kind: ErrorKind,
    message: String,
}

impl FlashError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IoFailure, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }
}

impl From<OsipError> for FlashError {
    fn from(err: OsipError) -> Self {
        Self::new(ErrorKind::CorruptIndex, err.to_string())
    }
}

impl From<VersionError> for FlashError {
    fn from(err: VersionError) -> Self {
        match err {
            VersionError::TruncatedFwInfo(_) => Self::io(err.to_string()),
            VersionError::MissingVersionRecord | VersionError::MalformedVersionRecord => {
                Self::new(ErrorKind::ParseError, err.to_string())
            }
        }
    }
}

impl From<StorageError> for FlashError {
    fn from(err: StorageError) -> Self {
        Self::io(err.to_string())
    }
}

impl From<std::io::Error> for FlashError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

pub type FlashResult<T> = Result<T, FlashError>;
