// Licensed under the Apache-2.0 license
#![allow(dead_code)]

use droidboot::modem::{ModemOperation, ProgressEvent};
use droidboot::platform::{
    ModemFlasher, ModemNvm, Partitioner, Platform, PowerControl, PrivilegedChannel,
    ProgressObserver, PropertyStore, RebootTarget, SecureToken, VolumeManager,
};
use droidboot::storage::MemStorage;
use droidboot::version::FirmwareInfoSource;
use droidboot::{Droidboot, DroidbootConfig};
use fw_version::{FipHeader, Version, FIP_HEADER_SIZE, FIP_SIGNATURE};
use log::LevelFilter;
use osip::{Attributes, OsiiEntry, OsipIndex};
use simple_logger::SimpleLogger;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use zerocopy::little_endian::U32;
use zerocopy::{FromZeros, IntoBytes};

pub const STORAGE_SIZE: usize = 0x10000;
/// Capacity of the `uefi` slot.
pub const UEFI_CAPACITY: u32 = 1000;

/// Shared, inspectable list of what a mock was asked to do.
#[derive(Debug)]
pub struct Shared<T>(Arc<Mutex<T>>);

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Default> Default for Shared<T> {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(T::default())))
    }
}

impl<T: Clone> Shared<T> {
    pub fn get(&self) -> T {
        self.0.lock().unwrap().clone()
    }
}

impl<T> Shared<T> {
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.0.lock().unwrap())
    }
}

pub fn test_osip() -> OsipIndex {
    let signed = Attributes::SIGNED | Attributes::OS_IMAGE;
    OsipIndex::new(vec![
        OsiiEntry::new("boot", signed, 0x10, 0x1000).unwrap(),
        OsiiEntry::new("recovery", signed, 0x20, 0x1000).unwrap(),
        OsiiEntry::new("fastboot", Attributes::OS_IMAGE, 0x30, 0x1000).unwrap(),
        OsiiEntry::unused(),
        OsiiEntry::new("uefi", Attributes::FIRMWARE, 0x40, UEFI_CAPACITY).unwrap(),
        OsiiEntry::new("splashscreen", Attributes::SPLASHSCREEN, 0x50, 0x800).unwrap(),
    ])
    .unwrap()
}

pub fn storage_with(osip: &OsipIndex) -> MemStorage {
    let mut raw = vec![0xffu8; STORAGE_SIZE];
    let header = osip.serialize();
    raw[..header.len()].copy_from_slice(&header);
    MemStorage::from_bytes(raw)
}

/// An IFWI image carrying one FIP header with the given IFWI version.
pub fn ifwi_image(major: u16, minor: u16) -> Vec<u8> {
    let mut fip = FipHeader::new_zeroed();
    fip.signature = U32::new(FIP_SIGNATURE);
    fip.ifwi_rev.set_version(Version::new(major, minor));
    fip.scuc_rev.set_version(Version::new(0x18, 0x03));
    let mut image = vec![0u8; 0x800];
    image[0x100..0x100 + FIP_HEADER_SIZE].copy_from_slice(fip.as_bytes());
    image
}

/// Device firmware-info record reporting the given IFWI version.
pub fn fw_info(major: u8, minor: u8) -> Vec<u8> {
    let mut raw = vec![0u8; 16];
    raw[0] = 0x03;
    raw[1] = 0x18;
    raw[6] = minor;
    raw[7] = major;
    raw
}

#[derive(Clone, Default)]
pub struct MockFirmwareInfo {
    pub raw: Shared<Option<Vec<u8>>>,
}

impl FirmwareInfoSource for MockFirmwareInfo {
    fn read_fw_info(&mut self) -> io::Result<Vec<u8>> {
        self.raw
            .get()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no fw_info"))
    }
}

#[derive(Clone, Default)]
pub struct MockChannel {
    pub packets: Shared<Vec<Vec<u8>>>,
    pub fail: Shared<bool>,
}

impl PrivilegedChannel for MockChannel {
    fn submit(&mut self, packet: &[u8]) -> io::Result<()> {
        self.packets.with(|p| p.push(packet.to_vec()));
        if self.fail.get() {
            return Err(io::Error::other("IPC rejected"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModemCall {
    pub image: PathBuf,
    pub image_contents: Option<Vec<u8>>,
    pub op: ModemOperation,
    pub certificate_contents: Option<Vec<u8>>,
}

#[derive(Clone, Default)]
pub struct MockModem {
    pub calls: Shared<Vec<ModemCall>>,
    pub resets: Shared<usize>,
    pub fail: Shared<bool>,
}

impl ModemFlasher for MockModem {
    fn run(
        &mut self,
        image: &Path,
        op: &ModemOperation,
        observer: &mut dyn ProgressObserver,
    ) -> io::Result<()> {
        let certificate_contents = match op {
            ModemOperation::WriteRndCertificate { certificate } => std::fs::read(certificate).ok(),
            _ => None,
        };
        self.calls.with(|c| {
            c.push(ModemCall {
                image: image.to_path_buf(),
                image_contents: std::fs::read(image).ok(),
                op: op.clone(),
                certificate_contents,
            })
        });
        observer.notify(&ProgressEvent::Synced);
        observer.notify(&ProgressEvent::Progress(100));
        if self.fail.get() {
            observer.notify(&ProgressEvent::Error("download failed".to_string()));
            return Err(io::Error::other("download failed"));
        }
        Ok(())
    }

    fn reset(&mut self) -> io::Result<()> {
        self.resets.with(|r| *r += 1);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockNvm {
    pub calls: Shared<Vec<String>>,
}

impl ModemNvm for MockNvm {
    fn apply(&mut self, path: &Path) -> io::Result<String> {
        self.calls
            .with(|c| c.push(format!("apply {}", path.display())));
        Ok("NVM applied".to_string())
    }

    fn apply_zip(&mut self, path: &Path) -> io::Result<String> {
        self.calls
            .with(|c| c.push(format!("applyzip {}", path.display())));
        Ok("NVM package applied".to_string())
    }

    fn identify(&mut self) -> io::Result<String> {
        self.calls.with(|c| c.push("identify".to_string()));
        Ok("NVM id 42".to_string())
    }
}

#[derive(Clone, Default)]
pub struct MockToken {
    pub consumed: Shared<Vec<Vec<u8>>>,
}

impl SecureToken for MockToken {
    fn consume(&mut self, token: &[u8]) -> io::Result<()> {
        if token.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "empty token"));
        }
        self.consumed.with(|c| c.push(token.to_vec()));
        Ok(())
    }

    fn unique_key(&mut self) -> io::Result<Vec<u8>> {
        Ok((0xe0..0xf4).collect())
    }
}

#[derive(Clone, Default)]
pub struct MockProperties {
    pub values: Shared<HashMap<String, String>>,
}

impl PropertyStore for MockProperties {
    fn get(&self, key: &str) -> Option<String> {
        self.values.with(|v| v.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> io::Result<()> {
        self.values
            .with(|v| v.insert(key.to_string(), value.to_string()));
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockPower {
    pub syncs: Shared<usize>,
    pub reboots: Shared<Vec<RebootTarget>>,
}

impl PowerControl for MockPower {
    fn sync(&mut self) {
        self.syncs.with(|s| *s += 1);
    }

    fn reboot(&mut self, target: RebootTarget) -> io::Result<()> {
        self.reboots.with(|r| r.push(target));
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockVolumes {
    pub calls: Shared<Vec<String>>,
}

impl VolumeManager for MockVolumes {
    fn nuke(&mut self, mount_point: &str, buffer_size: usize) -> io::Result<()> {
        self.calls
            .with(|c| c.push(format!("nuke {mount_point} {buffer_size}")));
        Ok(())
    }

    fn format(&mut self, mount_point: &str) -> io::Result<()> {
        self.calls.with(|c| c.push(format!("format {mount_point}")));
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockPartitioner {
    pub runs: Shared<usize>,
}

impl Partitioner for MockPartitioner {
    fn create_partitions(&mut self) -> io::Result<()> {
        self.runs.with(|r| *r += 1);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingObserver {
    pub events: Shared<Vec<ProgressEvent>>,
}

impl ProgressObserver for RecordingObserver {
    fn notify(&mut self, event: &ProgressEvent) {
        self.events.with(|e| e.push(event.clone()));
    }
}

pub struct TestSetup {
    pub droidboot: Droidboot,
    pub config: DroidbootConfig,
    pub root: TempDir,
    pub storage: MemStorage,
    pub firmware_info: MockFirmwareInfo,
    pub channel: MockChannel,
    pub modem: MockModem,
    pub nvm: MockNvm,
    pub token: MockToken,
    pub properties: MockProperties,
    pub power: MockPower,
    pub volumes: MockVolumes,
    pub partitioner: MockPartitioner,
    pub observer: RecordingObserver,
}

pub fn setup() -> TestSetup {
    setup_with_storage(storage_with(&test_osip()))
}

pub fn setup_with_storage(storage: MemStorage) -> TestSetup {
    // Initialize log level to debug (only once)
    let _ = SimpleLogger::new().with_level(LevelFilter::Debug).init();

    let root = tempfile::tempdir().unwrap();
    let config = DroidbootConfig::rooted_at(root.path());
    std::fs::create_dir_all(&config.scratch_dir).unwrap();

    let firmware_info = MockFirmwareInfo::default();
    firmware_info.raw.with(|r| *r = Some(fw_info(5, 0)));

    let channel = MockChannel::default();
    let modem = MockModem::default();
    let nvm = MockNvm::default();
    let token = MockToken::default();
    let properties = MockProperties::default();
    let power = MockPower::default();
    let volumes = MockVolumes::default();
    let partitioner = MockPartitioner::default();
    let observer = RecordingObserver::default();

    let platform = Platform {
        storage: Box::new(storage.clone()),
        firmware_info: Box::new(firmware_info.clone()),
        channel: Box::new(channel.clone()),
        modem: Box::new(modem.clone()),
        nvm: Box::new(nvm.clone()),
        token: Box::new(token.clone()),
        properties: Box::new(properties.clone()),
        power: Box::new(power.clone()),
        volumes: Box::new(volumes.clone()),
        partitioner: Box::new(partitioner.clone()),
        observer: Box::new(observer.clone()),
    };
    let droidboot = Droidboot::new(config.clone(), platform).unwrap();

    TestSetup {
        droidboot,
        config,
        root,
        storage,
        firmware_info,
        channel,
        modem,
        nvm,
        token,
        properties,
        power,
        volumes,
        partitioner,
        observer,
    }
}

impl TestSetup {
    pub fn slot_bytes(&self, name: &str, len: usize) -> Vec<u8> {
        let osip = test_osip();
        let entry = osip.entry(osip.resolve_by_name(name).unwrap()).unwrap();
        let start = entry.start_offset() as usize;
        self.storage.contents()[start..start + len].to_vec()
    }

    pub fn stage_dnx(&mut self) {
        self.droidboot
            .dispatch("flash dnx", &droidboot::Request::payload(b"dnx loader"))
            .unwrap();
    }

    pub fn scratch_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.config.scratch_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}
