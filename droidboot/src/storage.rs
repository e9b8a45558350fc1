// Licensed under the Apache-2.0 license

//! Byte-addressed access to the boot storage holding the OSIP and its slots.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Storage drivers implement this to expose the boot device.
pub trait BlockStorage {
    /// Fill `buffer` with the bytes starting at `offset`.
    fn read(&mut self, buffer: &mut [u8], offset: u64) -> Result<(), StorageError>;

    /// Write all of `buffer` starting at `offset`.
    fn write(&mut self, buffer: &[u8], offset: u64) -> Result<(), StorageError>;

    /// Flush pending writes to the medium.
    fn sync(&mut self) -> Result<(), StorageError>;

    /// Size of the storage in bytes.
    fn capacity(&self) -> u64;
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("access of {len} bytes at 0x{offset:x} exceeds storage size 0x{capacity:x}")]
    OutOfBounds { offset: u64, len: usize, capacity: u64 },
    #[error("storage I/O: {0}")]
    Io(#[from] std::io::Error),
}

fn check_bounds(offset: u64, len: usize, capacity: u64) -> Result<(), StorageError> {
    match offset.checked_add(len as u64) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(StorageError::OutOfBounds {
            offset,
            len,
            capacity,
        }),
    }
}

/// Block device or disk image file.
pub struct FileStorage {
    file: File,
    capacity: u64,
}

impl FileStorage {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        // seeking to the end also sizes block devices, where metadata reports 0
        let capacity = file.seek(SeekFrom::End(0))?;
        Ok(Self { file, capacity })
    }
}

impl BlockStorage for FileStorage {
    fn read(&mut self, buffer: &mut [u8], offset: u64) -> Result<(), StorageError> {
        check_bounds(offset, buffer.len(), self.capacity)?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buffer)?;
        Ok(())
    }

    fn write(&mut self, buffer: &[u8], offset: u64) -> Result<(), StorageError> {
        check_bounds(offset, buffer.len(), self.capacity)?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buffer)?;
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }
}

/// A mutating access recorded by [`MemStorage`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemOp {
    Write { offset: u64, len: usize },
    Sync,
}

#[derive(Debug, Default)]
struct MemInner {
    data: Vec<u8>,
    ops: Vec<MemOp>,
}

/// In-memory storage. Clones share the same contents, so a handle kept
/// outside the engine can inspect what was written.
#[derive(Clone, Debug, Default)]
pub struct MemStorage {
    inner: Arc<Mutex<MemInner>>,
}

impl MemStorage {
    /// Storage of `size` bytes, erased to 0xff.
    pub fn new(size: usize) -> Self {
        Self::from_bytes(vec![0xff; size])
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemInner {
                data,
                ..Default::default()
            })),
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        self.lock().data.clone()
    }

    /// Writes and syncs in the order they were issued.
    pub fn ops(&self) -> Vec<MemOp> {
        self.lock().ops.clone()
    }

    pub fn sync_count(&self) -> usize {
        self.count(|op| *op == MemOp::Sync)
    }

    pub fn write_count(&self) -> usize {
        self.count(|op| matches!(op, MemOp::Write { .. }))
    }

    fn count(&self, pred: impl Fn(&MemOp) -> bool) -> usize {
        self.lock().ops.iter().filter(|op| pred(op)).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemInner> {
        // contents stay consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl BlockStorage for MemStorage {
    fn read(&mut self, buffer: &mut [u8], offset: u64) -> Result<(), StorageError> {
        let inner = self.lock();
        check_bounds(offset, buffer.len(), inner.data.len() as u64)?;
        let start = offset as usize;
        buffer.copy_from_slice(&inner.data[start..start + buffer.len()]);
        Ok(())
    }

    fn write(&mut self, buffer: &[u8], offset: u64) -> Result<(), StorageError> {
        let mut inner = self.lock();
        check_bounds(offset, buffer.len(), inner.data.len() as u64)?;
        let start = offset as usize;
        let end = start + buffer.len();
        inner.data[start..end].copy_from_slice(buffer);
        inner.ops.push(MemOp::Write {
            offset,
            len: buffer.len(),
        });
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        self.lock().ops.push(MemOp::Sync);
        Ok(())
    }

    fn capacity(&self) -> u64 {
        self.lock().data.len() as u64
    }
}
