//! Non-volatile region: magic marker, calibration block and config blob.
//!
//! ```text
//! 0          magic (2 bytes)
//! 2          pitch    (W bytes)
//! 2 + W      velocity (W bytes)
//! 2 + 2W     config blob (ConfigBlob::SIZE bytes)
//! ```

mod blob;
mod file;
mod memory;
#[cfg(target_os = "espidf")]
mod nvs;

pub use blob::{BlobReader, BlobWriter, ConfigBlob};
pub use file::FileStore;
pub use memory::MemStore;
#[cfg(target_os = "espidf")]
pub use nvs::NvsStore;

pub const MAGIC_LENGTH: usize = 2;

/// Marker values qualifying the calibration block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagicPair {
    pub valid: [u8; MAGIC_LENGTH],
    pub cleared: [u8; MAGIC_LENGTH],
}

pub const MAGIC: MagicPair = MagicPair {
    valid: *b"CM",
    cleared: [0, 0],
};

/// Errors from the persisted region and its backends.
#[derive(Debug)]
pub enum StoreError {
    /// Access outside the backing region
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },
    /// Host file I/O
    Io(std::io::Error),
    /// Failure reported by the flash/NVS driver
    Backend(String),
    /// Saved region no longer fits the current layout
    SizeChanged { capacity: usize },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::OutOfBounds {
                offset,
                len,
                capacity,
            } => write!(
                f,
                "access of {} bytes at offset {} exceeds capacity {}",
                len, offset, capacity
            ),
            StoreError::Io(e) => write!(f, "I/O error: {}", e),
            StoreError::Backend(msg) => write!(f, "storage backend error: {}", msg),
            StoreError::SizeChanged { capacity } => {
                write!(f, "saved region does not fit {} bytes", capacity)
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

/// Byte-addressed non-volatile storage with an explicit commit.
///
/// Writes may be staged in RAM; only `commit` makes them durable.
pub trait NvStore {
    fn capacity(&self) -> usize;

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), StoreError>;

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StoreError>;

    fn commit(&mut self) -> Result<(), StoreError>;
}

/// Load a backend's saved region into a zeroed buffer of `capacity` bytes.
///
/// `load` reports how many bytes it found, `None` when nothing was saved.
/// A region saved under a different layout starts blank like a missing one.
pub(crate) fn load_region(
    capacity: usize,
    load: impl FnOnce(&mut [u8]) -> Result<Option<usize>, StoreError>,
) -> Result<Vec<u8>, StoreError> {
    let mut staged = vec![0u8; capacity];
    match load(&mut staged) {
        Ok(Some(len)) => log::info!("Loaded {} bytes of saved region", len),
        Ok(None) => log::info!("No saved region, starting blank"),
        Err(e @ StoreError::SizeChanged { .. }) => {
            log::warn!("Discarding saved region: {}", e);
            staged.fill(0);
        }
        Err(e) => return Err(e),
    }
    Ok(staged)
}

pub(crate) fn check_bounds(offset: usize, len: usize, capacity: usize) -> Result<(), StoreError> {
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(StoreError::OutOfBounds {
            offset,
            len,
            capacity,
        }),
    }
}

/// Offsets of the persisted region, fixed by the integrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub calibration_width: usize,
    pub config_size: usize,
}

impl Layout {
    pub fn new(calibration_width: usize, config_size: usize) -> Self {
        Self {
            calibration_width,
            config_size,
        }
    }

    pub const fn magic_offset(&self) -> usize {
        0
    }

    pub const fn pitch_offset(&self) -> usize {
        MAGIC_LENGTH
    }

    pub const fn velocity_offset(&self) -> usize {
        MAGIC_LENGTH + self.calibration_width
    }

    pub const fn config_offset(&self) -> usize {
        MAGIC_LENGTH + 2 * self.calibration_width
    }

    pub const fn total_size(&self) -> usize {
        self.config_offset() + self.config_size
    }
}

/// Calibration values as read back from storage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Calibration {
    pub pitch: String,
    pub velocity: String,
}

/// Raw calibration block, regardless of the marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCalibration {
    pub magic: [u8; MAGIC_LENGTH],
    pub pitch: String,
    pub velocity: String,
}

impl StoredCalibration {
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC.valid
    }
}

/// Copy `value` into a zero-padded field of `width` bytes, like `strncpy`.
pub(crate) fn fixed_width(value: &str, width: usize) -> Vec<u8> {
    let mut out = vec![0u8; width];
    let n = value.len().min(width);
    out[..n].copy_from_slice(&value.as_bytes()[..n]);
    out
}

/// Text up to the first NUL.
pub(crate) fn until_nul(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// The only component that touches the non-volatile store.
pub struct Storage {
    nv: Box<dyn NvStore>,
    layout: Layout,
}

impl Storage {
    pub fn new(nv: Box<dyn NvStore>, layout: Layout) -> anyhow::Result<Self> {
        if nv.capacity() < layout.total_size() {
            anyhow::bail!(
                "store holds {} bytes, layout needs {}",
                nv.capacity(),
                layout.total_size()
            );
        }
        Ok(Self { nv, layout })
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn read_config<C: ConfigBlob>(&self, config: &mut C) -> Result<(), StoreError> {
        let mut buf = vec![0u8; self.layout.config_size];
        self.nv.read(self.layout.config_offset(), &mut buf)?;
        config.decode(&buf);
        Ok(())
    }

    pub fn write_config<C: ConfigBlob>(&mut self, config: &C) -> Result<(), StoreError> {
        let mut buf = vec![0u8; self.layout.config_size];
        config.encode(&mut buf);
        self.nv.write(self.layout.config_offset(), &buf)?;
        self.nv.commit()
    }

    /// Rewrites marker, pitch and velocity, then commits.
    pub fn store_calibration(
        &mut self,
        pitch: &str,
        velocity: &str,
        reset_magic: bool,
    ) -> Result<(), StoreError> {
        let magic = if reset_magic {
            MAGIC.cleared
        } else {
            MAGIC.valid
        };
        let width = self.layout.calibration_width;
        self.nv.write(self.layout.magic_offset(), &magic)?;
        self.nv
            .write(self.layout.pitch_offset(), &fixed_width(pitch, width))?;
        self.nv
            .write(self.layout.velocity_offset(), &fixed_width(velocity, width))?;
        self.nv.commit()
    }

    pub fn stored_calibration(&self) -> Result<StoredCalibration, StoreError> {
        let width = self.layout.calibration_width;
        let mut magic = [0u8; MAGIC_LENGTH];
        let mut pitch = vec![0u8; width];
        let mut velocity = vec![0u8; width];
        self.nv.read(self.layout.magic_offset(), &mut magic)?;
        self.nv.read(self.layout.pitch_offset(), &mut pitch)?;
        self.nv.read(self.layout.velocity_offset(), &mut velocity)?;
        Ok(StoredCalibration {
            magic,
            pitch: until_nul(&pitch),
            velocity: until_nul(&velocity),
        })
    }

    /// Calibration values, only when the marker says they were saved.
    pub fn calibration(&self) -> Result<Option<Calibration>, StoreError> {
        let stored = self.stored_calibration()?;
        Ok(stored.is_valid().then(|| Calibration {
            pitch: stored.pitch,
            velocity: stored.velocity,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_region_keeps_loaded_bytes() {
        let staged = load_region(4, |buf| {
            buf[..2].copy_from_slice(b"CM");
            Ok(Some(2))
        })
        .unwrap();
        assert_eq!(staged, b"CM\0\0");
    }

    #[test]
    fn test_load_region_missing_is_blank() {
        assert_eq!(load_region(3, |_| Ok(None)).unwrap(), [0; 3]);
    }

    #[test]
    fn test_load_region_resized_layout_is_blank() {
        let staged = load_region(4, |buf| {
            buf.fill(0xaa);
            Err(StoreError::SizeChanged { capacity: 4 })
        })
        .unwrap();
        assert_eq!(staged, [0; 4]);
    }

    #[test]
    fn test_load_region_backend_failure_propagates() {
        let err = load_region(4, |_| Err(StoreError::Backend("flash gone".into()))).unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[derive(Debug, Default, PartialEq, Clone)]
    struct Sample {
        a: u16,
        on: bool,
    }

    impl ConfigBlob for Sample {
        const SIZE: usize = 3;

        fn encode(&self, out: &mut [u8]) {
            BlobWriter::new(out).u16(self.a).bool(self.on);
        }

        fn decode(&mut self, bytes: &[u8]) {
            let mut r = BlobReader::new(bytes);
            self.a = r.u16();
            self.on = r.bool();
        }
    }

    fn storage(width: usize) -> (Storage, MemStore) {
        let layout = Layout::new(width, Sample::SIZE);
        let mem = MemStore::new(layout.total_size());
        (
            Storage::new(Box::new(mem.clone()), layout).unwrap(),
            mem,
        )
    }

    #[test]
    fn test_layout_offsets() {
        let l = Layout::new(4, 10);
        assert_eq!(l.pitch_offset(), 2);
        assert_eq!(l.velocity_offset(), 6);
        assert_eq!(l.config_offset(), 10);
        assert_eq!(l.total_size(), 20);
    }

    #[test]
    fn test_rejects_small_store() {
        let layout = Layout::new(4, 10);
        assert!(Storage::new(Box::new(MemStore::new(19)), layout).is_err());
    }

    #[test]
    fn test_config_round_trip() {
        let (mut storage, _) = storage(4);
        let saved = Sample { a: 513, on: true };
        storage.write_config(&saved).unwrap();

        let mut loaded = Sample::default();
        storage.read_config(&mut loaded).unwrap();
        assert_eq!(loaded, saved);
    }

    #[test]
    fn test_calibration_layout() {
        let (mut storage, mem) = storage(4);
        storage.store_calibration("60", "100", false).unwrap();

        assert_eq!(
            mem.committed(),
            vec![b'C', b'M', b'6', b'0', 0, 0, b'1', b'0', b'0', 0, 0, 0, 0]
        );
        assert_eq!(
            storage.calibration().unwrap(),
            Some(Calibration {
                pitch: "60".to_string(),
                velocity: "100".to_string(),
            })
        );
    }

    #[test]
    fn test_calibration_truncated_to_width() {
        let (mut storage, _) = storage(2);
        storage.store_calibration("1234", "9", false).unwrap();
        let stored = storage.stored_calibration().unwrap();
        assert_eq!(stored.pitch, "12");
        assert_eq!(stored.velocity, "9");
    }

    #[test]
    fn test_reset_magic_invalidates() {
        let (mut storage, _) = storage(4);
        storage.store_calibration("60", "100", false).unwrap();
        storage.store_calibration("", "", true).unwrap();
        let stored = storage.stored_calibration().unwrap();
        assert_eq!(stored.magic, MAGIC.cleared);
        assert_eq!(storage.calibration().unwrap(), None);
    }

    #[test]
    fn test_commit_failure_surfaces() {
        let (mut storage, mem) = storage(4);
        mem.fail_commits(true);
        assert!(storage.write_config(&Sample { a: 1, on: false }).is_err());
        assert_eq!(mem.committed(), vec![0; 13]);
    }
}
