// Licensed under the Apache-2.0 license

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Device paths and tunables. Every field has a default, so a config file
/// only needs the values it changes.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DroidbootConfig {
    /// Block device holding the OSIP and its slots.
    pub osip_device: PathBuf,
    pub ipc_device: PathBuf,
    pub fw_info: PathBuf,
    /// Directory for staged images (`__dnx.bin`, `__ifwi.bin`, `radio.img`).
    pub scratch_dir: PathBuf,
    pub dnx_timeout: PathBuf,
    pub hsi_port: PathBuf,
    pub cpu3_node: PathBuf,
    pub default_prop: PathBuf,
    pub usb_serial: PathBuf,
    pub erase_buffer_size: usize,
}

impl Default for DroidbootConfig {
    fn default() -> Self {
        Self {
            osip_device: "/dev/mmcblk0".into(),
            ipc_device: "/dev/mid_ipc".into(),
            fw_info: "/sys/kernel/fw_update/fw_info/fw_version".into(),
            scratch_dir: "/tmp".into(),
            dnx_timeout: "/sys/devices/platform/intel_mid_umip/current_timeout".into(),
            hsi_port: "/sys/bus/hsi/devices/port0".into(),
            cpu3_node: "/sys/class/cpuid/cpu3/dev".into(),
            default_prop: "/default.prop".into(),
            usb_serial: "/sys/class/android_usb/android0/iSerial".into(),
            erase_buffer_size: 4_000_000,
        }
    }
}

impl DroidbootConfig {
    pub fn load(path: &Path) -> io::Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> io::Result<Self> {
        toml::de::from_str(contents).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// All config paths moved under `root`, for running against a fake
    /// device tree.
    pub fn rooted_at(root: &Path) -> Self {
        let rebase = |p: PathBuf| root.join(p.strip_prefix("/").unwrap_or(&p));
        let d = Self::default();
        Self {
            osip_device: rebase(d.osip_device),
            ipc_device: rebase(d.ipc_device),
            fw_info: rebase(d.fw_info),
            scratch_dir: rebase(d.scratch_dir),
            dnx_timeout: rebase(d.dnx_timeout),
            hsi_port: rebase(d.hsi_port),
            cpu3_node: rebase(d.cpu3_node),
            default_prop: rebase(d.default_prop),
            usb_serial: rebase(d.usb_serial),
            erase_buffer_size: d.erase_buffer_size,
        }
    }

    pub fn dnx_path(&self) -> PathBuf {
        self.scratch_dir.join("__dnx.bin")
    }

    pub fn ifwi_path(&self) -> PathBuf {
        self.scratch_dir.join("__ifwi.bin")
    }

    pub fn radio_path(&self) -> PathBuf {
        self.scratch_dir.join("radio.img")
    }

    pub fn radio_rnd_path(&self) -> PathBuf {
        self.scratch_dir.join("radio_rnd.img")
    }
}
