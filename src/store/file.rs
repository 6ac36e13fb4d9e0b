use std::fs;
use std::path::{Path, PathBuf};

use super::{check_bounds, NvStore, StoreError};

/// Host stand-in for the flash region: one file, staged in RAM.
///
/// A missing or short file reads as zeroes. `commit` writes a sibling temp
/// file and renames it over the old one.
pub struct FileStore {
    path: PathBuf,
    staged: Vec<u8>,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut staged = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("{} does not exist yet, starting blank", path.display());
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        staged.resize(capacity, 0);
        Ok(Self { path, staged })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NvStore for FileStore {
    fn capacity(&self) -> usize {
        self.staged.len()
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), StoreError> {
        check_bounds(offset, buf.len(), self.staged.len())?;
        buf.copy_from_slice(&self.staged[offset..offset + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StoreError> {
        check_bounds(offset, data.len(), self.staged.len())?;
        self.staged[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &self.staged)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
