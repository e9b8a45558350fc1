// Licensed under the Apache-2.0 license

//! Firmware versions of the running device.

use crate::error::FlashResult;
use fw_version::{Component, FirmwareVersions, VersionTuple, FW_INFO_SIZE};
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;

/// Privileged read path to the device firmware-info record.
pub trait FirmwareInfoSource {
    fn read_fw_info(&mut self) -> io::Result<Vec<u8>>;
}

/// The record exported by the kernel firmware-update driver.
pub struct SysfsFirmwareInfo {
    path: PathBuf,
}

impl SysfsFirmwareInfo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FirmwareInfoSource for SysfsFirmwareInfo {
    fn read_fw_info(&mut self) -> io::Result<Vec<u8>> {
        let mut raw = Vec::with_capacity(FW_INFO_SIZE);
        File::open(&self.path)?
            .take(FW_INFO_SIZE as u64)
            .read_to_end(&mut raw)?;
        Ok(raw)
    }
}

pub fn current_device_versions(
    source: &mut dyn FirmwareInfoSource,
) -> FlashResult<FirmwareVersions> {
    let raw = source.read_fw_info()?;
    Ok(FirmwareVersions::from_fw_info(&raw)?)
}

/// IFWI version the device is running.
pub fn current_device_version(source: &mut dyn FirmwareInfoSource) -> FlashResult<VersionTuple> {
    Ok(current_device_versions(source)?.get(Component::Ifwi))
}
