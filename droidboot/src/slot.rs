// Licensed under the Apache-2.0 license

//! Slot-level access to the boot storage.
//!
//! Every operation re-reads the OSIP from offset 0, so a write issued after
//! an out-of-band change sees the current layout.

use crate::error::{ErrorKind, FlashError, FlashResult};
use crate::storage::BlockStorage;
use log::{debug, info};
use osip::{Attributes, OsiiEntry, OsipIndex, OSIP_MAX_SIZE};

/// How a flash command names its target slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotSelector<'a> {
    Name(&'a str),
    Attribute(Attributes),
}

impl SlotSelector<'_> {
    pub fn resolve(&self, index: &OsipIndex) -> FlashResult<usize> {
        let found = match self {
            SlotSelector::Name(name) => index.resolve_by_name(name),
            SlotSelector::Attribute(mask) => index.resolve_by_attribute(*mask),
        };
        found.ok_or_else(|| {
            FlashError::new(ErrorKind::NotFound, format!("no OSIP slot for {self}"))
        })
    }
}

impl core::fmt::Display for SlotSelector<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SlotSelector::Name(name) => write!(f, "'{name}'"),
            SlotSelector::Attribute(mask) => write!(f, "attribute 0x{:02x}", mask.bits()),
        }
    }
}

/// Reads and writes OSIP slots on a storage device.
pub struct ImageWriter<'a> {
    storage: &'a mut dyn BlockStorage,
}

impl<'a> ImageWriter<'a> {
    pub fn new(storage: &'a mut dyn BlockStorage) -> Self {
        Self { storage }
    }

    /// Parses the OSIP region at the start of the storage.
    pub fn read_index(&mut self) -> FlashResult<OsipIndex> {
        let len = OSIP_MAX_SIZE.min(self.storage.capacity() as usize);
        let mut raw = vec![0u8; len];
        self.storage.read(&mut raw, 0)?;
        Ok(OsipIndex::parse(&raw)?)
    }

    /// Writes `data` at the start of slot `index`. The slot's bytes past
    /// `data.len()` and the OSIP itself are left untouched.
    pub fn write(&mut self, index: usize, data: &[u8]) -> FlashResult<()> {
        let osip = self.read_index()?;
        let entry = entry_at(&osip, index)?;
        if data.len() as u64 > entry.capacity() {
            return Err(FlashError::new(
                ErrorKind::OversizeImage,
                format!(
                    "image of {} bytes exceeds slot {index} capacity of {} bytes",
                    data.len(),
                    entry.capacity()
                ),
            ));
        }

        info!(
            "Writing {} bytes to OSIP slot {index} '{}' at 0x{:x}",
            data.len(),
            String::from_utf8_lossy(entry.name()),
            entry.start_offset()
        );
        self.storage.sync()?;
        self.storage.write(data, entry.start_offset())?;
        self.storage.sync()?;
        debug!("Slot {index} written");
        Ok(())
    }

    /// Resolves `selector` against the current OSIP and writes to that slot.
    pub fn write_selected(
        &mut self,
        selector: SlotSelector<'_>,
        data: &[u8],
    ) -> FlashResult<usize> {
        let index = selector.resolve(&self.read_index()?)?;
        self.write(index, data)?;
        Ok(index)
    }

    /// Full contents of slot `index`.
    pub fn read(&mut self, index: usize) -> FlashResult<Vec<u8>> {
        let osip = self.read_index()?;
        let entry = entry_at(&osip, index)?;
        let mut data = vec![0u8; entry.capacity() as usize];
        self.storage.read(&mut data, entry.start_offset())?;
        Ok(data)
    }
}

fn entry_at(osip: &OsipIndex, index: usize) -> FlashResult<OsiiEntry> {
    match osip.entry(index) {
        Some(entry) if !entry.is_unused() => Ok(*entry),
        _ => Err(FlashError::new(
            ErrorKind::NotFound,
            format!("OSIP slot {index} is not in use"),
        )),
    }
}
