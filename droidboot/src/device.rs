// Licensed under the Apache-2.0 license

use crate::config::DroidbootConfig;
use crate::error::FlashResult;
use crate::platform::Platform;
use crate::slot::ImageWriter;
use crate::update_sm::{self, DefaultActions, StateMachine, StateMachineActions};
use crate::version::current_device_versions;
use fw_version::FirmwareVersions;

/// State every command handler runs against.
pub struct DeviceContext {
    pub config: DroidbootConfig,
    pub platform: Platform,
}

impl DeviceContext {
    pub fn new(config: DroidbootConfig, platform: Platform) -> Self {
        Self { config, platform }
    }

    pub fn image_writer(&mut self) -> ImageWriter<'_> {
        ImageWriter::new(self.platform.storage.as_mut())
    }

    pub fn device_versions(&mut self) -> FlashResult<FirmwareVersions> {
        current_device_versions(self.platform.firmware_info.as_mut())
    }

    /// An IFWI update machine in `Idle`, wired to this device.
    pub fn ifwi_update<'a, T: StateMachineActions>(
        &'a mut self,
        actions: T,
        image: &'a [u8],
        reset_after_update: bool,
    ) -> StateMachine<update_sm::Context<'a, T>> {
        let platform = &mut self.platform;
        StateMachine::new(update_sm::Context::new(
            actions,
            image,
            reset_after_update,
            self.config.ifwi_path(),
            self.config.dnx_path(),
            platform.storage.as_mut(),
            platform.firmware_info.as_mut(),
            platform.channel.as_mut(),
            platform.observer.as_mut(),
        ))
    }

    /// Runs a complete IFWI update of `image`.
    pub fn update_ifwi(&mut self, image: &[u8], reset_after_update: bool) -> FlashResult<()> {
        let mut sm = self.ifwi_update(DefaultActions, image, reset_after_update);
        update_sm::run(&mut sm)
    }
}
