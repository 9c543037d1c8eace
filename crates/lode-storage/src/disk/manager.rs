//! Disk manager: page-granular file I/O.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use lode_common::constants::PAGE_SIZE;
use lode_common::types::PageId;
use parking_lot::Mutex;

use super::error::{DiskError, DiskResult};

/// Synchronous page I/O against block storage.
///
/// Implementations persist and retrieve fixed-size pages addressed by
/// [`PageId`]. All operations run to completion on the calling thread;
/// errors are fatal to the operation that triggered them.
pub trait DiskManager: Send + Sync {
    /// Reads the page into `buf`.
    ///
    /// `buf` must be exactly [`PAGE_SIZE`] bytes. Reading a page that was
    /// never written yields zeroes.
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> DiskResult<()>;

    /// Persists `data` as the contents of the page.
    ///
    /// `data` must be exactly [`PAGE_SIZE`] bytes.
    fn write_page(&self, page_id: PageId, data: &[u8]) -> DiskResult<()>;

    /// Releases a page id back to the disk layer.
    ///
    /// The caller guarantees no further reads of the page until it is
    /// written again.
    fn deallocate_page(&self, page_id: PageId) -> DiskResult<()>;

    /// Forces all written pages to stable storage.
    fn sync(&self) -> DiskResult<()>;
}

/// [`DiskManager`] backed by a single database file.
///
/// Pages live at offset `page_id * PAGE_SIZE`. The file handle is behind a
/// mutex; each read or write seeks and transfers one page. Reads past the
/// end of the file zero-fill the tail of the buffer, so fetching a page
/// that was allocated but never flushed behaves like reading fresh zeroed
/// storage.
pub struct FileDiskManager {
    /// The database file, serialized behind a mutex.
    file: Mutex<File>,
    /// The file path.
    path: PathBuf,
    /// Number of pages handed back via `deallocate_page`.
    deallocated: AtomicU64,
}

impl FileDiskManager {
    /// Opens (creating if necessary) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> DiskResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|e| DiskError::open(&path, e))?;

        Ok(Self {
            file: Mutex::new(file),
            path,
            deallocated: AtomicU64::new(0),
        })
    }

    /// Returns the database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns how many pages have been deallocated over the manager's
    /// lifetime.
    pub fn deallocated_pages(&self) -> u64 {
        self.deallocated.load(Ordering::Relaxed)
    }

    fn page_offset(page_id: PageId) -> DiskResult<u64> {
        if !page_id.is_valid() {
            return Err(DiskError::InvalidPageId { page_id });
        }
        Ok(page_id.as_u64() * PAGE_SIZE as u64)
    }
}

impl DiskManager for FileDiskManager {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> DiskResult<()> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        let offset = Self::page_offset(page_id)?;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled < buf.len() {
            // The page lies wholly or partly beyond EOF: it was allocated
            // but never written. Hand back zeroes for the missing bytes.
            tracing::warn!(%page_id, read = filled, "short page read, zero-filling tail");
            buf[filled..].fill(0);
        }

        Ok(())
    }

    fn write_page(&self, page_id: PageId, data: &[u8]) -> DiskResult<()> {
        debug_assert_eq!(data.len(), PAGE_SIZE);
        let offset = Self::page_offset(page_id)?;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;

        Ok(())
    }

    fn deallocate_page(&self, page_id: PageId) -> DiskResult<()> {
        if !page_id.is_valid() {
            return Err(DiskError::InvalidPageId { page_id });
        }
        // The file keeps its length; the slot is simply fair game for a
        // future allocator. Only the count is tracked today.
        self.deallocated.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn sync(&self) -> DiskResult<()> {
        let file = self.file.lock();
        file.sync_all()?;
        Ok(())
    }
}

impl std::fmt::Debug for FileDiskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDiskManager")
            .field("path", &self.path)
            .field("deallocated", &self.deallocated_pages())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn page_of(byte: u8) -> Vec<u8> {
        vec![byte; PAGE_SIZE]
    }

    #[test]
    fn test_open_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let disk = FileDiskManager::open(&path).unwrap();
        assert_eq!(disk.path(), path);
        assert!(path.exists());
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let disk = FileDiskManager::open(dir.path().join("rw.db")).unwrap();

        disk.write_page(PageId::new(0), &page_of(0xAB)).unwrap();

        let mut buf = page_of(0);
        disk.read_page(PageId::new(0), &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_pages_do_not_overlap() {
        let dir = tempdir().unwrap();
        let disk = FileDiskManager::open(dir.path().join("multi.db")).unwrap();

        disk.write_page(PageId::new(0), &page_of(1)).unwrap();
        disk.write_page(PageId::new(1), &page_of(2)).unwrap();
        disk.write_page(PageId::new(2), &page_of(3)).unwrap();

        let mut buf = page_of(0);
        disk.read_page(PageId::new(1), &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 2));
    }

    #[test]
    fn test_read_past_eof_zero_fills() {
        let dir = tempdir().unwrap();
        let disk = FileDiskManager::open(dir.path().join("eof.db")).unwrap();

        let mut buf = page_of(0xFF);
        disk.read_page(PageId::new(7), &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_invalid_page_id_rejected() {
        let dir = tempdir().unwrap();
        let disk = FileDiskManager::open(dir.path().join("bad.db")).unwrap();

        let mut buf = page_of(0);
        assert!(disk.read_page(PageId::INVALID, &mut buf).is_err());
        assert!(disk.write_page(PageId::INVALID, &buf).is_err());
        assert!(disk.deallocate_page(PageId::INVALID).is_err());
    }

    #[test]
    fn test_deallocate_counts() {
        let dir = tempdir().unwrap();
        let disk = FileDiskManager::open(dir.path().join("dealloc.db")).unwrap();

        assert_eq!(disk.deallocated_pages(), 0);
        disk.deallocate_page(PageId::new(3)).unwrap();
        disk.deallocate_page(PageId::new(4)).unwrap();
        assert_eq!(disk.deallocated_pages(), 2);
    }

    #[test]
    fn test_sync() {
        let dir = tempdir().unwrap();
        let disk = FileDiskManager::open(dir.path().join("sync.db")).unwrap();

        disk.write_page(PageId::new(0), &page_of(9)).unwrap();
        disk.sync().unwrap();
    }
}
