use esp_idf_svc::nvs::EspDefaultNvs;
use esp_idf_svc::sys::{EspError, ESP_ERR_NVS_INVALID_LENGTH};

use super::{check_bounds, load_region, NvStore, StoreError};

/// NVS key holding the whole region.
const NVS_KEY: &str = "region";

/// The persisted region kept as a single NVS blob.
///
/// Mirrors EEPROM emulation: the blob is loaded once into RAM, writes touch
/// the RAM copy and `commit` rewrites the blob.
pub struct NvsStore {
    nvs: EspDefaultNvs,
    staged: Vec<u8>,
}

impl NvsStore {
    pub fn new(nvs: EspDefaultNvs, capacity: usize) -> Result<Self, StoreError> {
        let staged = load_region(capacity, |buf| {
            nvs.get_blob(NVS_KEY, buf)
                .map(|found| found.map(|b| b.len()))
                .map_err(|e| blob_error(e, capacity))
        })?;
        Ok(Self { nvs, staged })
    }
}

/// A stored blob larger than the buffer means the layout changed.
fn blob_error(e: EspError, capacity: usize) -> StoreError {
    if e.code() == ESP_ERR_NVS_INVALID_LENGTH as i32 {
        StoreError::SizeChanged { capacity }
    } else {
        StoreError::Backend(format!("{:?}", e))
    }
}

impl NvStore for NvsStore {
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
        self.nvs
            .set_blob(NVS_KEY, &self.staged)
            .map_err(|e| StoreError::Backend(format!("{:?}", e)))
    }
}
