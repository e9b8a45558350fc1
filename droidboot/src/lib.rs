// Licensed under the Apache-2.0 license

//! Flashing engine of the droidboot bootloader extension.
//!
//! Boot images are written into the slots described by the OSIP index at the
//! start of the boot storage. IFWI updates are version gated and committed
//! through the platform firmware. Operations are reached by name through a
//! [`CommandRegistry`] owned by [`Droidboot`].

pub mod commands;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod modem;
pub mod platform;
pub mod scratch;
pub mod slot;
pub mod storage;
pub mod update_sm;
pub mod version;

pub use config::DroidbootConfig;
pub use device::DeviceContext;
pub use dispatch::{CommandRegistry, Reply, Request};
pub use error::{ErrorKind, FlashError, FlashResult};
pub use platform::Platform;

use log::{error, info};

/// Android property holding the running build id.
pub const BUILD_ID_PROPERTY: &str = "ro.build.display.id";

/// Composition root: the command table and the device it acts on.
pub struct Droidboot {
    registry: CommandRegistry<DeviceContext>,
    device: DeviceContext,
}

impl Droidboot {
    /// Builds the engine with the full flash and maintenance command set.
    pub fn new(config: DroidbootConfig, platform: Platform) -> FlashResult<Self> {
        let mut registry = CommandRegistry::new();
        commands::register_all(&mut registry)?;
        info!("droidboot: {} commands registered", registry.len());
        Ok(Self {
            registry,
            device: DeviceContext::new(config, platform),
        })
    }

    pub fn dispatch(&mut self, name: &str, request: &Request<'_>) -> FlashResult<Reply> {
        let result = self.registry.dispatch(name, &mut self.device, request);
        if let Err(e) = &result {
            error!("'{name}' failed: {e}");
        }
        result
    }

    pub fn registry(&self) -> &CommandRegistry<DeviceContext> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut CommandRegistry<DeviceContext> {
        &mut self.registry
    }

    pub fn device(&mut self) -> &mut DeviceContext {
        &mut self.device
    }

    /// Logs the OSIP, the running build and firmware versions, and returns
    /// the same text.
    pub fn startup_report(&mut self) -> String {
        let mut report = String::new();
        match self.device.image_writer().read_index() {
            Ok(osip) => report.push_str(&osip.to_string()),
            Err(e) => {
                error!("OSIP read failure: {e}");
                report.push_str("OSIP read failure!\n");
            }
        }
        if let Some(build) = self.device.platform.properties.get(BUILD_ID_PROPERTY) {
            report.push_str(&format!("Build: {build}\n"));
        }
        match self.device.device_versions() {
            Ok(versions) => {
                report.push_str("Current FW versions: (CHAABI versions unreadable at runtime)\n");
                report.push_str(&versions.to_string());
            }
            Err(e) => {
                error!("Can't query kernel for current FW version: {e}");
                report.push_str("Current FW versions unavailable\n");
            }
        }
        for line in report.lines() {
            info!("{line}");
        }
        report
    }
}
