// Licensed under the Apache-2.0 license

use log::{debug, warn};
use std::fs;
use std::io;
use std::mem::{self, ManuallyDrop};
use std::path::{Path, PathBuf};

/// A staged file that is deleted when dropped.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    /// Writes `data` to `path`. A partially written file is removed before
    /// the error is returned.
    pub fn create(path: PathBuf, data: &[u8]) -> io::Result<Self> {
        let file = Self { path };
        fs::write(&file.path, data)?;
        debug!("Staged {} bytes at {}", data.len(), file.path.display());
        Ok(file)
    }

    /// Takes ownership of a file staged by an earlier operation.
    pub fn adopt(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path)
    }

    /// Leaves the file on disk.
    pub fn persist(self) -> PathBuf {
        let mut file = ManuallyDrop::new(self);
        mem::take(&mut file.path)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Unable to remove {}: {e}", self.path.display()),
        }
    }
}
