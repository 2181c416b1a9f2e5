//! Disk manager for page-level file I/O.

use basalt_common::config::StorageConfig;
use basalt_common::page::{PageId, PAGE_SIZE};
use basalt_common::{BasaltError, Result};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Configuration for the disk manager.
#[derive(Debug, Clone)]
pub struct DiskManagerConfig {
    /// Path of the data file.
    pub data_path: PathBuf,
    /// Enable fsync after writes.
    pub fsync_enabled: bool,
}

impl Default for DiskManagerConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("./basalt.db"),
            fsync_enabled: true,
        }
    }
}

impl From<&StorageConfig> for DiskManagerConfig {
    fn from(config: &StorageConfig) -> Self {
        Self {
            data_path: config.data_path.clone(),
            fsync_enabled: config.fsync_enabled,
        }
    }
}

/// Manages reading and writing pages in a single data file.
///
/// Deallocated pages go onto an in-memory free list and are reused by later
/// allocations within the same process. Pages freed in a previous run are
/// simply never referenced again.
pub struct DiskManager {
    config: DiskManagerConfig,
    inner: Mutex<DiskInner>,
}

struct DiskInner {
    file: File,
    num_pages: u32,
    free_list: Vec<PageId>,
}

impl DiskManager {
    /// Opens (or creates) the data file.
    pub fn new(config: DiskManagerConfig) -> Result<Self> {
        if let Some(parent) = config.data_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&config.data_path)?;

        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as u32;

        Ok(Self {
            config,
            inner: Mutex::new(DiskInner {
                file,
                num_pages,
                free_list: Vec::new(),
            }),
        })
    }

    /// Returns the data file path.
    pub fn data_path(&self) -> &Path {
        &self.config.data_path
    }

    /// Reads a page from disk.
    pub fn read_page(&self, page_id: PageId) -> Result<[u8; PAGE_SIZE]> {
        let mut inner = self.inner.lock();

        if !page_id.is_valid() || page_id.0 >= inner.num_pages {
            return Err(BasaltError::PageNotFound { page_id: page_id.0 });
        }

        inner.file.seek(SeekFrom::Start(page_id.file_offset()))?;

        let mut buffer = [0u8; PAGE_SIZE];
        inner.file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    /// Writes a page to disk.
    pub fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let mut inner = self.inner.lock();

        inner.file.seek(SeekFrom::Start(page_id.file_offset()))?;
        inner.file.write_all(data)?;

        if self.config.fsync_enabled {
            inner.file.sync_all()?;
        }

        if page_id.0 >= inner.num_pages {
            inner.num_pages = page_id.0 + 1;
        }

        Ok(())
    }

    /// Allocates a page, reusing a previously deallocated one if available.
    ///
    /// Fresh pages extend the file by one zeroed page.
    pub fn allocate_page(&self) -> Result<PageId> {
        let mut inner = self.inner.lock();

        if let Some(page_id) = inner.free_list.pop() {
            return Ok(page_id);
        }

        let page_id = PageId(inner.num_pages);

        inner.file.seek(SeekFrom::Start(page_id.file_offset()))?;
        inner.file.write_all(&[0u8; PAGE_SIZE])?;

        if self.config.fsync_enabled {
            inner.file.sync_all()?;
        }

        inner.num_pages = page_id.0 + 1;

        Ok(page_id)
    }

    /// Returns a page to the free list for reuse.
    pub fn deallocate_page(&self, page_id: PageId) {
        if page_id.is_valid() {
            self.inner.lock().free_list.push(page_id);
        }
    }

    /// Returns the number of pages in the data file.
    pub fn num_pages(&self) -> u32 {
        self.inner.lock().num_pages
    }

    /// Flushes pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.inner.lock().file.sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
