// Licensed under the Apache-2.0 license

//! Services the engine consumes but does not implement.
//!
//! Each trait is a narrow seam over an external component: the modem
//! download library, the secure element, the partition table tool, volume
//! formatting, the property service and the reboot service. `Platform`
//! owns one implementation of each.

use crate::modem::{ModemOperation, ProgressEvent};
use crate::storage::BlockStorage;
use crate::version::FirmwareInfoSource;
use log::{debug, error, info};
use std::fs::OpenOptions;
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

/// Hands a firmware update packet to the platform firmware.
pub trait PrivilegedChannel {
    /// Submits `packet` in one request. Once this is called the request is
    /// never cancelled.
    fn submit(&mut self, packet: &[u8]) -> io::Result<()>;
}

pub trait ModemFlasher {
    /// Runs `op` against the modem using the firmware image at `image`.
    fn run(
        &mut self,
        image: &Path,
        op: &ModemOperation,
        observer: &mut dyn ProgressObserver,
    ) -> io::Result<()>;

    fn reset(&mut self) -> io::Result<()>;
}

pub trait ModemNvm {
    fn apply(&mut self, path: &Path) -> io::Result<String>;
    fn apply_zip(&mut self, path: &Path) -> io::Result<String>;
    fn identify(&mut self) -> io::Result<String>;
}

pub trait SecureToken {
    fn consume(&mut self, token: &[u8]) -> io::Result<()>;
    fn unique_key(&mut self) -> io::Result<Vec<u8>>;
}

pub trait PropertyStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> io::Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebootTarget {
    Android,
    Bootloader,
}

impl RebootTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            RebootTarget::Android => "android",
            RebootTarget::Bootloader => "bootloader",
        }
    }
}

pub trait PowerControl {
    fn sync(&mut self);
    fn reboot(&mut self, target: RebootTarget) -> io::Result<()>;
}

pub trait VolumeManager {
    /// Overwrites the volume mounted at `mount_point` using a buffer of
    /// `buffer_size` bytes.
    fn nuke(&mut self, mount_point: &str, buffer_size: usize) -> io::Result<()>;
    fn format(&mut self, mount_point: &str) -> io::Result<()>;
}

pub trait Partitioner {
    fn create_partitions(&mut self) -> io::Result<()>;
}

/// Receives status, progress and error events of long-running operations.
pub trait ProgressObserver {
    fn notify(&mut self, event: &ProgressEvent);
}

/// Observer that reports every event through the logger.
#[derive(Debug, Default)]
pub struct LogObserver {
    last_progress: Option<u8>,
}

impl ProgressObserver for LogObserver {
    fn notify(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Booting => debug!("modem: Booting..."),
            ProgressEvent::Synced => info!("modem: Device Synchronized"),
            ProgressEvent::Downloading(component) => info!("modem: Loading Component {component}"),
            ProgressEvent::Detail(msg) => info!("modem: <msg> {msg}"),
            ProgressEvent::Error(msg) => error!("modem: ERROR: {msg}"),
            ProgressEvent::Progress(pct) => {
                if self.last_progress != Some(*pct) {
                    info!("    <Progress> {pct}%");
                }
                self.last_progress = Some(*pct);
                return;
            }
            ProgressEvent::Version(version) => info!("modem: Version: {version}"),
            ProgressEvent::Status(msg) => info!("{msg}"),
        }
        self.last_progress = None;
    }
}

/// Stand-in for a service the host does not provide.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unsupported;

impl Unsupported {
    fn err<T>(what: &str) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("{what} is not available on this platform"),
        ))
    }
}

impl PrivilegedChannel for Unsupported {
    fn submit(&mut self, _packet: &[u8]) -> io::Result<()> {
        Self::err("firmware update channel")
    }
}

impl ModemFlasher for Unsupported {
    fn run(
        &mut self,
        _: &Path,
        _: &ModemOperation,
        _: &mut dyn ProgressObserver,
    ) -> io::Result<()> {
        Self::err("modem flashing")
    }

    fn reset(&mut self) -> io::Result<()> {
        Self::err("modem reset")
    }
}

impl ModemNvm for Unsupported {
    fn apply(&mut self, _: &Path) -> io::Result<String> {
        Self::err("modem NVM")
    }

    fn apply_zip(&mut self, _: &Path) -> io::Result<String> {
        Self::err("modem NVM")
    }

    fn identify(&mut self) -> io::Result<String> {
        Self::err("modem NVM")
    }
}

impl SecureToken for Unsupported {
    fn consume(&mut self, _: &[u8]) -> io::Result<()> {
        Self::err("secure token")
    }

    fn unique_key(&mut self) -> io::Result<Vec<u8>> {
        Self::err("secure token")
    }
}

impl PropertyStore for Unsupported {
    fn get(&self, _: &str) -> Option<String> {
        None
    }

    fn set(&mut self, key: &str, _: &str) -> io::Result<()> {
        Self::err(&format!("property {key}"))
    }
}

impl PowerControl for Unsupported {
    fn sync(&mut self) {}

    fn reboot(&mut self, _: RebootTarget) -> io::Result<()> {
        Self::err("reboot")
    }
}

impl VolumeManager for Unsupported {
    fn nuke(&mut self, _: &str, _: usize) -> io::Result<()> {
        Self::err("volume erase")
    }

    fn format(&mut self, _: &str) -> io::Result<()> {
        Self::err("volume format")
    }
}

impl Partitioner for Unsupported {
    fn create_partitions(&mut self) -> io::Result<()> {
        Self::err("repartitioning")
    }
}

const DEVICE_FW_UPGRADE: u32 = 0xA4;

/// Firmware update channel of the SCU IPC driver.
pub struct IpcChannel {
    device: PathBuf,
}

impl IpcChannel {
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

impl PrivilegedChannel for IpcChannel {
    fn submit(&mut self, packet: &[u8]) -> io::Result<()> {
        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.device)?;
        // SAFETY: the driver reads the header and the image that follows it
        // from `packet`, which stays borrowed for the duration of the call.
        let ret = unsafe {
            libc::ioctl(device.as_raw_fd(), DEVICE_FW_UPGRADE as _, packet.as_ptr())
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

/// Everything the command handlers act on.
pub struct Platform {
    pub storage: Box<dyn BlockStorage>,
    pub firmware_info: Box<dyn FirmwareInfoSource>,
    pub channel: Box<dyn PrivilegedChannel>,
    pub modem: Box<dyn ModemFlasher>,
    pub nvm: Box<dyn ModemNvm>,
    pub token: Box<dyn SecureToken>,
    pub properties: Box<dyn PropertyStore>,
    pub power: Box<dyn PowerControl>,
    pub volumes: Box<dyn VolumeManager>,
    pub partitioner: Box<dyn Partitioner>,
    pub observer: Box<dyn ProgressObserver>,
}

impl Platform {
    /// A platform with the given storage and firmware paths, where every
    /// other service is [`Unsupported`].
    pub fn new(
        storage: Box<dyn BlockStorage>,
        firmware_info: Box<dyn FirmwareInfoSource>,
        channel: Box<dyn PrivilegedChannel>,
    ) -> Self {
        Self {
            storage,
            firmware_info,
            channel,
            modem: Box::new(Unsupported),
            nvm: Box::new(Unsupported),
            token: Box::new(Unsupported),
            properties: Box::new(Unsupported),
            power: Box::new(Unsupported),
            volumes: Box::new(Unsupported),
            partitioner: Box::new(Unsupported),
            observer: Box::new(LogObserver::default()),
        }
    }
}
