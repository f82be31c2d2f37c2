use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::error::{DiskError, DiskResult};
use super::{PAGE_SIZE, PageId};

/// Contract between the buffer pool and the backing page store.
///
/// Implementations are synchronous and blocking. Reading a page that was
/// never written yields all zeros.
pub trait DiskManager: Send {
    /// Read a page into `buf`, fully overwriting it.
    /// `buf` must be exactly `PAGE_SIZE` bytes.
    fn read_page(&mut self, page_id: PageId, buf: &mut [u8]) -> DiskResult<()>;

    /// Write a page from `buf`. Idempotent at the disk layer.
    /// `buf` must be exactly `PAGE_SIZE` bytes.
    fn write_page(&mut self, page_id: PageId, buf: &[u8]) -> DiskResult<()>;

    /// Durability barrier: everything written so far reaches stable storage.
    fn sync(&mut self) -> DiskResult<()>;

    /// Final sync before the store goes away. Called once at teardown.
    fn shut_down(&mut self) -> DiskResult<()> {
        self.sync()
    }
}

pub(super) fn check_buffer(len: usize) -> DiskResult<()> {
    if len != PAGE_SIZE {
        return Err(DiskError::InvalidBufferSize {
            expected: PAGE_SIZE,
            actual: len,
        });
    }
    Ok(())
}

/// Single-file paged store: page `n` lives at byte offset `n * PAGE_SIZE`
pub struct FileDiskManager {
    file: File,
}

impl FileDiskManager {
    /// Open the store at `path`, creating the file if it does not exist
    pub fn open<P: AsRef<Path>>(path: P) -> DiskResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        Ok(Self { file })
    }

    /// Number of pages the file currently spans
    pub fn page_count(&self) -> DiskResult<usize> {
        let len = self.file.metadata()?.len();
        Ok(len.div_ceil(PAGE_SIZE as u64) as usize)
    }
}

impl DiskManager for FileDiskManager {
    fn read_page(&mut self, page_id: PageId, buf: &mut [u8]) -> DiskResult<()> {
        check_buffer(buf.len())?;

        let offset = (page_id * PAGE_SIZE) as u64;
        self.file.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < PAGE_SIZE {
            let n = self.file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        // Anything past the end of the file reads as zeros
        buf[filled..].fill(0);
        Ok(())
    }

    fn write_page(&mut self, page_id: PageId, buf: &[u8]) -> DiskResult<()> {
        check_buffer(buf.len())?;

        let offset = (page_id * PAGE_SIZE) as u64;
        let required = offset + PAGE_SIZE as u64;

        // Extend the file if necessary so the write lands at this offset
        let current = self.file.metadata()?.len();
        if current < required {
            self.file.set_len(required)?;
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        // No sync here; the OS may batch writes until sync() is called

        Ok(())
    }

    fn sync(&mut self) -> DiskResult<()> {
        self.file.sync_data()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_env() -> (TempDir, FileDiskManager) {
        let temp_dir = tempfile::tempdir().unwrap();
        let manager = FileDiskManager::open(temp_dir.path().join("test.db")).unwrap();
        (temp_dir, manager)
    }

    #[test]
    fn test_open_creates_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("fresh.db");

        assert!(!path.exists());
        let _manager = FileDiskManager::open(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_read_write_page() {
        let (_temp_dir, mut manager) = setup_test_env();

        let mut write_buffer = vec![0u8; PAGE_SIZE];
        write_buffer[0] = 42;
        write_buffer[100] = 99;
        write_buffer[PAGE_SIZE - 1] = 255;

        manager.write_page(0, &write_buffer).unwrap();

        let mut read_buffer = vec![0u8; PAGE_SIZE];
        manager.read_page(0, &mut read_buffer).unwrap();

        assert_eq!(read_buffer, write_buffer);
    }

    #[test]
    fn test_write_multiple_pages() {
        let (_temp_dir, mut manager) = setup_test_env();

        for page_id in 0..10 {
            let mut buffer = vec![0u8; PAGE_SIZE];
            buffer[0] = page_id as u8;
            manager.write_page(page_id, &buffer).unwrap();
        }

        for page_id in 0..10 {
            let mut buffer = vec![0u8; PAGE_SIZE];
            manager.read_page(page_id, &mut buffer).unwrap();
            assert_eq!(buffer[0], page_id as u8);
        }
    }

    #[test]
    fn test_read_unwritten_page_is_zeroed() {
        let (_temp_dir, mut manager) = setup_test_env();

        let mut buffer = vec![0xFFu8; PAGE_SIZE];
        manager.read_page(100, &mut buffer).unwrap();
        assert!(buffer.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_write_sparse_page_extends_file() {
        let (_temp_dir, mut manager) = setup_test_env();

        assert_eq!(manager.page_count().unwrap(), 0);

        let buffer = vec![7u8; PAGE_SIZE];
        manager.write_page(5, &buffer).unwrap();
        assert_eq!(manager.page_count().unwrap(), 6);

        // the skipped-over pages read back as zeros
        let mut hole = vec![0xFFu8; PAGE_SIZE];
        manager.read_page(2, &mut hole).unwrap();
        assert!(hole.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_invalid_buffer_size() {
        let (_temp_dir, mut manager) = setup_test_env();

        let mut small_buffer = vec![0u8; PAGE_SIZE - 1];
        let result = manager.read_page(0, &mut small_buffer);
        assert!(matches!(result, Err(DiskError::InvalidBufferSize { .. })));

        let large_buffer = vec![0u8; PAGE_SIZE + 1];
        let result = manager.write_page(0, &large_buffer);
        assert!(matches!(result, Err(DiskError::InvalidBufferSize { .. })));
    }

    #[test]
    fn test_data_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("test.db");

        {
            let mut manager = FileDiskManager::open(&path).unwrap();
            let mut buffer = vec![0u8; PAGE_SIZE];
            buffer[0] = 88;
            manager.write_page(3, &buffer).unwrap();
            manager.shut_down().unwrap();
        }

        let mut manager = FileDiskManager::open(&path).unwrap();
        let mut buffer = vec![0u8; PAGE_SIZE];
        manager.read_page(3, &mut buffer).unwrap();
        assert_eq!(buffer[0], 88);
        assert_eq!(manager.page_count().unwrap(), 4);
    }
}
