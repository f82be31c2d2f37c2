use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::disk_manager::{DiskManager, check_buffer};
use super::error::DiskResult;
use super::{PAGE_SIZE, PageId};

type PageImage = Box<[u8; PAGE_SIZE]>;

/// In-memory page store for tests.
///
/// Clones share the same underlying store, so a test can hand one handle to
/// the buffer pool and keep another to inspect what was written through it.
#[derive(Clone, Default)]
pub struct MemoryDiskManager {
    pages: Arc<Mutex<HashMap<PageId, PageImage>>>,
}

impl MemoryDiskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of a page as last written, or None if it was never written
    pub fn snapshot(&self, page_id: PageId) -> Option<PageImage> {
        self.pages.lock().get(&page_id).cloned()
    }

    /// Number of distinct pages ever written
    pub fn page_count(&self) -> usize {
        self.pages.lock().len()
    }
}

impl DiskManager for MemoryDiskManager {
    fn read_page(&mut self, page_id: PageId, buf: &mut [u8]) -> DiskResult<()> {
        check_buffer(buf.len())?;
        match self.pages.lock().get(&page_id) {
            Some(page) => buf.copy_from_slice(&page[..]),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_page(&mut self, page_id: PageId, buf: &[u8]) -> DiskResult<()> {
        check_buffer(buf.len())?;
        let mut page: PageImage = Box::new([0u8; PAGE_SIZE]);
        page[..].copy_from_slice(buf);
        self.pages.lock().insert(page_id, page);
        Ok(())
    }

    fn sync(&mut self) -> DiskResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_roundtrip() {
        let mut disk = MemoryDiskManager::new();

        let mut buffer = vec![0u8; PAGE_SIZE];
        buffer[0] = 1;
        buffer[PAGE_SIZE - 1] = 2;
        disk.write_page(7, &buffer).unwrap();

        let mut read_back = vec![0u8; PAGE_SIZE];
        disk.read_page(7, &mut read_back).unwrap();
        assert_eq!(read_back, buffer);
    }

    #[test]
    fn test_unwritten_page_reads_zeros() {
        let mut disk = MemoryDiskManager::new();

        let mut buffer = vec![0xFFu8; PAGE_SIZE];
        disk.read_page(0, &mut buffer).unwrap();
        assert!(buffer.iter().all(|&b| b == 0));
        assert_eq!(disk.page_count(), 0);
    }

    #[test]
    fn test_clones_share_the_store() {
        let disk = MemoryDiskManager::new();
        let mut writer = disk.clone();

        let mut buffer = vec![0u8; PAGE_SIZE];
        buffer[0] = 42;
        writer.write_page(3, &buffer).unwrap();

        let snapshot = disk.snapshot(3).unwrap();
        assert_eq!(snapshot[0], 42);
        assert_eq!(disk.page_count(), 1);
    }
}
