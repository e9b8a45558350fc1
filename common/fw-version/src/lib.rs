// Licensed under the Apache-2.0 license

//! Firmware version records.
//!
//! IFWI images embed one or more FIP (firmware interface profile) headers,
//! each starting with `"$FIP"` on a 4-byte boundary. The running device
//! reports its versions as a 16-byte firmware-info record.

use core::fmt;
use core::mem::size_of;
use thiserror::Error;
use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const FIP_SIGNATURE: u32 = u32::from_le_bytes(*b"$FIP");
pub const FIP_HEADER_SIZE: usize = size_of::<FipHeader>();
pub const FW_INFO_SIZE: usize = 16;

const FIP_SCAN_STRIDE: usize = 4;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("no FIP version record found in image")]
    MissingVersionRecord,
    #[error("FIP version record carries no IFWI version")]
    MalformedVersionRecord,
    #[error("firmware info record too short: {0} bytes")]
    TruncatedFwInfo(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Component {
    Ifwi,
    Scu,
    Hooks,
    Ia32,
    Chaabi,
    Mia,
}

impl Component {
    pub const ALL: [Component; 6] = [
        Component::Ifwi,
        Component::Scu,
        Component::Hooks,
        Component::Ia32,
        Component::Chaabi,
        Component::Mia,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Component::Ifwi => "IFWI",
            Component::Scu => "SCU",
            Component::Hooks => "Hooks/OEM",
            Component::Ia32 => "IA32",
            Component::Chaabi => "Chaabi",
            Component::Mia => "mIA",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}

impl Version {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    pub fn is_zero(&self) -> bool {
        self.major == 0 && self.minor == 0
    }

    /// Takes every non-zero field of `other`.
    fn merge(&mut self, other: Version) {
        if other.major != 0 {
            self.major = other.major;
        }
        if other.minor != 0 {
            self.minor = other.minor;
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}.{:02X}", self.major, self.minor)
    }
}

/// Version of one firmware component.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VersionTuple {
    pub component: Component,
    pub major: u16,
    pub minor: u16,
}

impl VersionTuple {
    pub fn new(component: Component, major: u16, minor: u16) -> Self {
        Self {
            component,
            major,
            minor,
        }
    }

    pub fn version(&self) -> Version {
        Version::new(self.major, self.minor)
    }
}

impl fmt::Display for VersionTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.component.label(), self.version())
    }
}

/// An update is allowed when the majors agree. The minor may move in either
/// direction, so downgrades within a major are accepted.
pub fn is_update_compatible(image: &VersionTuple, device: &VersionTuple) -> bool {
    image.major == device.major
}

/// IFWI version carried by `image`.
pub fn extract_version(image: &[u8]) -> Result<VersionTuple, VersionError> {
    Ok(FirmwareVersions::from_image(image)?.get(Component::Ifwi))
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct FipVersionBlock {
    pub minor: U16,
    pub major: U16,
    pub checksum: u8,
    pub reserved8: u8,
    pub reserved16: U16,
}

impl FipVersionBlock {
    pub fn version(&self) -> Version {
        Version::new(self.major.get(), self.minor.get())
    }

    pub fn set_version(&mut self, version: Version) {
        self.major = version.major.into();
        self.minor = version.minor.into();
    }
}

/// Version block of the CH01..CH15 components, which also carry a load size
/// and destination.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct FipChxxBlock {
    pub block: FipVersionBlock,
    pub size: U16,
    pub dest: U16,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct FipHeader {
    pub signature: U32,
    pub umip_rev: FipVersionBlock,
    pub spat_rev: FipVersionBlock,
    pub spct_rev: FipVersionBlock,
    pub rpch_rev: FipVersionBlock,
    pub ch00_rev: FipVersionBlock,
    pub mipd_rev: FipVersionBlock,
    pub mipn_rev: FipVersionBlock,
    pub scuc_rev: FipVersionBlock,
    pub hvm_rev: FipVersionBlock,
    pub mia_rev: FipVersionBlock,
    pub ia32_rev: FipVersionBlock,
    pub oem_rev: FipVersionBlock,
    pub ved_rev: FipVersionBlock,
    pub vec_rev: FipVersionBlock,
    pub mos_rev: FipVersionBlock,
    pub pos_rev: FipVersionBlock,
    pub cos_rev: FipVersionBlock,
    pub chxx_rev: [FipChxxBlock; 15],
    pub dnx_rev: FipVersionBlock,
    pub reserved0_rev: FipVersionBlock,
    pub reserved1_rev: FipVersionBlock,
    pub ifwi_rev: FipVersionBlock,
}

/// Versions of every component the update path cares about.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FirmwareVersions {
    pub ifwi: Version,
    pub scu: Version,
    pub hooks: Version,
    pub ia32: Version,
    pub chaabi: Version,
    pub mia: Version,
}

impl FirmwareVersions {
    /// Scans `image` for FIP headers and merges the non-zero fields of each
    /// one found, in image order. A header must fit entirely in the image.
    pub fn from_image(image: &[u8]) -> Result<Self, VersionError> {
        let signature = FIP_SIGNATURE.to_le_bytes();
        let mut versions = Self::default();
        let mut found = false;
        let mut offset = 0;
        while offset + FIP_HEADER_SIZE <= image.len() {
            if image[offset..].starts_with(&signature) {
                if let Ok((fip, _)) = FipHeader::read_from_prefix(&image[offset..]) {
                    versions.merge_fip(&fip);
                    found = true;
                }
            }
            offset += FIP_SCAN_STRIDE;
        }

        if !found {
            return Err(VersionError::MissingVersionRecord);
        }
        if versions.ifwi.is_zero() {
            return Err(VersionError::MalformedVersionRecord);
        }
        Ok(versions)
    }

    /// Decodes the device firmware-info record: (minor, major) byte pairs for
    /// SCU, IA32, hooks, IFWI, Chaabi and mIA.
    pub fn from_fw_info(raw: &[u8]) -> Result<Self, VersionError> {
        if raw.len() < FW_INFO_SIZE {
            return Err(VersionError::TruncatedFwInfo(raw.len()));
        }
        let pair = |i: usize| Version::new(raw[i + 1] as u16, raw[i] as u16);
        Ok(Self {
            scu: pair(0),
            ia32: pair(2),
            hooks: pair(4),
            ifwi: pair(6),
            chaabi: pair(8),
            mia: pair(10),
        })
    }

    pub fn get(&self, component: Component) -> VersionTuple {
        let v = match component {
            Component::Ifwi => self.ifwi,
            Component::Scu => self.scu,
            Component::Hooks => self.hooks,
            Component::Ia32 => self.ia32,
            Component::Chaabi => self.chaabi,
            Component::Mia => self.mia,
        };
        VersionTuple::new(component, v.major, v.minor)
    }

    fn merge_fip(&mut self, fip: &FipHeader) {
        self.scu.merge(fip.scuc_rev.version());
        self.ia32.merge(fip.ia32_rev.version());
        self.hooks.merge(fip.oem_rev.version());
        self.ifwi.merge(fip.ifwi_rev.version());
        self.chaabi.merge(fip.ch00_rev.version());
        self.mia.merge(fip.mia_rev.version());
    }
}

impl fmt::Display for FirmwareVersions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for component in Component::ALL {
            writeln!(
                f,
                "{:>10}: {}",
                component.label(),
                self.get(component).version()
            )?;
        }
        Ok(())
    }
}
