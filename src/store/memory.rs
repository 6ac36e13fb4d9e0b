use std::cell::RefCell;
use std::rc::Rc;

use super::{check_bounds, NvStore, StoreError};

#[derive(Debug)]
struct Cells {
    staged: Vec<u8>,
    committed: Vec<u8>,
    fail_commits: bool,
    commits: usize,
}

/// RAM-backed store, zero-initialised.
///
/// Clones share the same cells, so a test can keep a handle after boxing one
/// into the manager and inspect what actually reached "flash".
#[derive(Debug, Clone)]
pub struct MemStore {
    cells: Rc<RefCell<Cells>>,
}

impl MemStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            cells: Rc::new(RefCell::new(Cells {
                staged: vec![0; capacity],
                committed: vec![0; capacity],
                fail_commits: false,
                commits: 0,
            })),
        }
    }

    /// Bytes as of the last successful commit.
    pub fn committed(&self) -> Vec<u8> {
        self.cells.borrow().committed.clone()
    }

    /// Number of successful commits.
    pub fn commit_count(&self) -> usize {
        self.cells.borrow().commits
    }

    /// Make every following commit fail until reset.
    pub fn fail_commits(&self, fail: bool) {
        self.cells.borrow_mut().fail_commits = fail;
    }
}

impl NvStore for MemStore {
    fn capacity(&self) -> usize {
        self.cells.borrow().staged.len()
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), StoreError> {
        let cells = self.cells.borrow();
        check_bounds(offset, buf.len(), cells.staged.len())?;
        buf.copy_from_slice(&cells.staged[offset..offset + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StoreError> {
        let mut cells = self.cells.borrow_mut();
        check_bounds(offset, data.len(), cells.staged.len())?;
        cells.staged[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let mut cells = self.cells.borrow_mut();
        if cells.fail_commits {
            return Err(StoreError::Backend("injected commit failure".to_string()));
        }
        cells.committed = cells.staged.clone();
        cells.commits += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_is_staged_until_commit() {
        let mut mem = MemStore::new(4);
        mem.write(1, &[7, 8]).unwrap();

        let mut buf = [0u8; 4];
        mem.read(0, &mut buf).unwrap();
        assert_eq!(buf, [0, 7, 8, 0]);
        assert_eq!(mem.committed(), vec![0; 4]);

        mem.commit().unwrap();
        assert_eq!(mem.committed(), vec![0, 7, 8, 0]);
        assert_eq!(mem.commit_count(), 1);
    }

    #[test]
    fn test_out_of_bounds() {
        let mut mem = MemStore::new(4);
        assert!(matches!(
            mem.write(3, &[1, 2]),
            Err(StoreError::OutOfBounds { offset: 3, len: 2, capacity: 4 })
        ));
    }
}
