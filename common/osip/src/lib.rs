// Licensed under the Apache-2.0 license

//! OS Image Profile (OSIP) index.
//!
//! The OSIP lives at offset 0 of the boot storage. It is a fixed 32-byte
//! header followed by up to [`MAX_OSII_ENTRIES`] 40-byte OS image identifier
//! (OSII) records, each describing one flashable slot. All multi-byte fields
//! are little endian.

mod resolver;

use bitflags::bitflags;
use core::fmt;
use core::mem::{offset_of, size_of};
use core::ops::Range;
use thiserror::Error;
use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

pub const OSIP_SIGNATURE: u32 = u32::from_le_bytes(*b"$OS$");
pub const OSIP_HEADER_REV_MAJOR: u8 = 0x01;
pub const OSIP_HEADER_REV_MINOR: u8 = 0x00;

pub const MAX_OSII_ENTRIES: usize = 7;
pub const OSII_NAME_LEN: usize = 16;

/// Unit of `logical_start_block`.
pub const BLOCK_SIZE: u64 = 512;

pub const OSIP_HEADER_SIZE: usize = size_of::<OsipHeader>();
pub const OSII_ENTRY_SIZE: usize = size_of::<OsiiEntry>();
/// Largest OSIP region a valid header can describe.
pub const OSIP_MAX_SIZE: usize = OSIP_HEADER_SIZE + MAX_OSII_ENTRIES * OSII_ENTRY_SIZE;

const CHECKSUM_OFFSET: usize = offset_of!(OsipHeader, header_checksum);

bitflags! {
    /// Attribute bits of an OSII record. A record with no bits set is unused.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Attributes: u8 {
        const SIGNED = 0x01;
        const OS_IMAGE = 0x02;
        const FIRMWARE = 0x04;
        const SPLASHSCREEN = 0x08;
        const FILESYSTEM = 0x10;
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OsipError {
    #[error("OSIP region too small: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("bad OSIP signature 0x{0:08x}")]
    BadSignature(u32),
    #[error("OSIP declares {0} entries, more than the supported maximum")]
    TooManyEntries(usize),
    #[error("OSIP header size {declared} does not match {expected} for its entry count")]
    BadHeaderSize { declared: usize, expected: usize },
    #[error("OSIP checksum mismatch (stored 0x{stored:02x}, computed 0x{computed:02x})")]
    ChecksumMismatch { stored: u8, computed: u8 },
    #[error("OSIP entries {first} and {second} overlap")]
    OverlappingEntries { first: usize, second: usize },
    #[error("OSIP entry name '{0}' is used more than once")]
    DuplicateName(String),
    #[error("invalid OSIP entry name '{0}'")]
    InvalidName(String),
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct OsipHeader {
    pub signature: U32,
    pub intel_reserved: u8,
    pub header_rev_minor: u8,
    pub header_rev_major: u8,
    pub header_checksum: u8,
    /// Number of OSII records following the header.
    pub num_pointers: u8,
    pub num_images: u8,
    pub header_size: U16,
    pub reserved: [U32; 5],
}

impl OsipHeader {
    pub fn entry_count(&self) -> usize {
        self.num_pointers as usize
    }

    pub fn header_size(&self) -> usize {
        self.header_size.get() as usize
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct OsiiEntry {
    pub name: [u8; OSII_NAME_LEN],
    pub os_rev_minor: U16,
    pub os_rev_major: U16,
    pub logical_start_block: U32,
    /// Slot capacity in bytes.
    pub capacity: U32,
    pub ddr_load_address: U32,
    pub entry_point: U32,
    pub attribute: u8,
    pub reserved: [u8; 3],
}

impl OsiiEntry {
    pub fn new(
        name: &str,
        attributes: Attributes,
        start_block: u32,
        capacity: u32,
    ) -> Result<Self, OsipError> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > OSII_NAME_LEN || bytes.contains(&0) {
            return Err(OsipError::InvalidName(name.to_string()));
        }
        let mut entry = Self::unused();
        entry.name[..bytes.len()].copy_from_slice(bytes);
        entry.attribute = attributes.bits();
        entry.logical_start_block = start_block.into();
        entry.capacity = capacity.into();
        Ok(entry)
    }

    /// An all-zero record.
    pub fn unused() -> Self {
        Self::new_zeroed()
    }

    pub fn with_os_revision(mut self, major: u16, minor: u16) -> Self {
        self.os_rev_major = major.into();
        self.os_rev_minor = minor.into();
        self
    }

    pub fn with_load_address(mut self, ddr_load_address: u32, entry_point: u32) -> Self {
        self.ddr_load_address = ddr_load_address.into();
        self.entry_point = entry_point.into();
        self
    }

    /// Name bytes without the NUL padding.
    pub fn name(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(OSII_NAME_LEN);
        &self.name[..len]
    }

    pub fn attributes(&self) -> Attributes {
        Attributes::from_bits_retain(self.attribute)
    }

    pub fn is_unused(&self) -> bool {
        self.attribute == 0
    }

    pub fn start_offset(&self) -> u64 {
        self.logical_start_block.get() as u64 * BLOCK_SIZE
    }

    pub fn capacity(&self) -> u64 {
        self.capacity.get() as u64
    }

    /// Byte range of the slot on storage.
    pub fn region(&self) -> Range<u64> {
        let start = self.start_offset();
        start..start + self.capacity()
    }
}

/// A validated OSIP header together with its entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OsipIndex {
    header: OsipHeader,
    entries: Vec<OsiiEntry>,
}

impl OsipIndex {
    /// Builds a consistent index (sizes, counts and checksum) for `entries`.
    pub fn new(entries: Vec<OsiiEntry>) -> Result<Self, OsipError> {
        if entries.len() > MAX_OSII_ENTRIES {
            return Err(OsipError::TooManyEntries(entries.len()));
        }
        validate_entries(&entries)?;

        let header = OsipHeader {
            signature: OSIP_SIGNATURE.into(),
            intel_reserved: 0,
            header_rev_minor: OSIP_HEADER_REV_MINOR,
            header_rev_major: OSIP_HEADER_REV_MAJOR,
            header_checksum: 0,
            num_pointers: entries.len() as u8,
            num_images: entries.iter().filter(|e| !e.is_unused()).count() as u8,
            header_size: (region_size(entries.len()) as u16).into(),
            reserved: [U32::new(0); 5],
        };
        let mut index = Self { header, entries };
        index.header.header_checksum = checksum(&index.serialize());
        Ok(index)
    }

    /// Parses the OSIP region at the start of `raw`. Bytes past the declared
    /// header size are ignored.
    pub fn parse(raw: &[u8]) -> Result<Self, OsipError> {
        let (header, _) =
            OsipHeader::read_from_prefix(raw).map_err(|_| OsipError::Truncated {
                needed: OSIP_HEADER_SIZE,
                available: raw.len(),
            })?;

        if header.signature != OSIP_SIGNATURE {
            return Err(OsipError::BadSignature(header.signature.get()));
        }
        let count = header.entry_count();
        if count > MAX_OSII_ENTRIES {
            return Err(OsipError::TooManyEntries(count));
        }
        let expected = region_size(count);
        if header.header_size() != expected {
            return Err(OsipError::BadHeaderSize {
                declared: header.header_size(),
                expected,
            });
        }
        if raw.len() < expected {
            return Err(OsipError::Truncated {
                needed: expected,
                available: raw.len(),
            });
        }

        let region = &raw[..expected];
        let computed = checksum(region);
        if computed != header.header_checksum {
            return Err(OsipError::ChecksumMismatch {
                stored: header.header_checksum,
                computed,
            });
        }

        let entries = region[OSIP_HEADER_SIZE..]
            .chunks_exact(OSII_ENTRY_SIZE)
            .map(OsiiEntry::read_from_bytes)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| OsipError::Truncated {
                needed: expected,
                available: raw.len(),
            })?;
        validate_entries(&entries)?;

        Ok(Self { header, entries })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut raw = Vec::with_capacity(region_size(self.entries.len()));
        raw.extend_from_slice(self.header.as_bytes());
        for entry in &self.entries {
            raw.extend_from_slice(entry.as_bytes());
        }
        raw
    }

    pub fn header(&self) -> &OsipHeader {
        &self.header
    }

    pub fn entries(&self) -> &[OsiiEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&OsiiEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for OsipIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = &self.header;
        writeln!(
            f,
            "OSIP header: rev {:02X}.{:02X} size {} checksum 0x{:02x} pointers {} images {}",
            h.header_rev_major,
            h.header_rev_minor,
            h.header_size(),
            h.header_checksum,
            h.num_pointers,
            h.num_images,
        )?;
        for (i, e) in self.entries.iter().enumerate() {
            if e.is_unused() {
                writeln!(f, "  [{i}] <unused>")?;
                continue;
            }
            writeln!(
                f,
                "  [{i}] {:<16} attr 0x{:02x} rev {:04X}.{:04X} lba 0x{:08x} capacity 0x{:08x} load 0x{:08x} entry 0x{:08x}",
                String::from_utf8_lossy(e.name()),
                e.attribute,
                e.os_rev_major.get(),
                e.os_rev_minor.get(),
                e.logical_start_block.get(),
                e.capacity.get(),
                e.ddr_load_address.get(),
                e.entry_point.get(),
            )?;
        }
        Ok(())
    }
}

fn region_size(count: usize) -> usize {
    OSIP_HEADER_SIZE + count * OSII_ENTRY_SIZE
}

/// XOR of every byte of the OSIP region, with the checksum byte read as 0.
fn checksum(region: &[u8]) -> u8 {
    region
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != CHECKSUM_OFFSET)
        .fold(0u8, |acc, (_, &b)| acc ^ b)
}

fn validate_entries(entries: &[OsiiEntry]) -> Result<(), OsipError> {
    for (i, a) in entries.iter().enumerate() {
        if a.is_unused() {
            continue;
        }
        for (j, b) in entries.iter().enumerate().skip(i + 1) {
            if b.is_unused() {
                continue;
            }
            if a.name() == b.name() {
                return Err(OsipError::DuplicateName(
                    String::from_utf8_lossy(a.name()).into_owned(),
                ));
            }
            let (ra, rb) = (a.region(), b.region());
            if ra.start < rb.end && rb.start < ra.end {
                return Err(OsipError::OverlappingEntries {
                    first: i,
                    second: j,
                });
            }
        }
    }
    Ok(())
}
