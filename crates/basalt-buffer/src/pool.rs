//! Buffer pool manager.

use crate::disk::DiskManager;
use crate::frame::{Frame, FrameId};
use crate::guard::{ReadPageGuard, WritePageGuard};
use crate::page_table::PageTable;
use crate::replacer::{LruKReplacer, Replacer};
use basalt_common::config::StorageConfig;
use basalt_common::page::{PageId, PAGE_SIZE};
use basalt_common::{BasaltError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use sysinfo::System;

/// Configuration for the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool.
    pub num_frames: usize,
    /// K parameter of the LRU-K replacement policy.
    pub lru_k: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            num_frames: 1024,
            lru_k: 2,
        }
    }
}

impl From<&StorageConfig> for BufferPoolConfig {
    fn from(config: &StorageConfig) -> Self {
        Self {
            num_frames: config.buffer_pool_frames,
            lru_k: config.lru_k,
        }
    }
}

/// Buffer pool manager.
///
/// Manages a fixed-size pool of page frames with:
/// - Page ID to frame ID mapping (lock-free page table)
/// - Free frame list for unused frames
/// - LRU-K replacement for eviction, consulted whenever a frame is needed
/// - Pin counting for concurrent access
/// - Read-through / write-back against the disk manager
///
/// Pages are handed out only through [`ReadPageGuard`] and
/// [`WritePageGuard`]; acquiring a guard pins the frame and takes its latch,
/// dropping it releases both.
pub struct BufferPoolManager {
    config: BufferPoolConfig,
    frames: Vec<Frame>,
    page_table: PageTable,
    free_list: Mutex<Vec<FrameId>>,
    replacer: LruKReplacer,
    disk: Arc<DiskManager>,
    /// Serializes page-table misses so two threads cannot fault the same
    /// page into two frames.
    miss_lock: Mutex<()>,
}

impl BufferPoolManager {
    /// Creates a new buffer pool over the given disk manager.
    pub fn new(config: BufferPoolConfig, disk: Arc<DiskManager>) -> Self {
        let num_frames = config.num_frames;

        let frames: Vec<_> = (0..num_frames)
            .map(|i| Frame::new(FrameId(i as u32)))
            .collect();

        // All frames start in the free list.
        let free_list: Vec<_> = (0..num_frames).rev().map(|i| FrameId(i as u32)).collect();

        Self {
            replacer: LruKReplacer::new(num_frames, config.lru_k),
            config,
            frames,
            page_table: PageTable::new(num_frames),
            free_list: Mutex::new(free_list),
            disk,
            miss_lock: Mutex::new(()),
        }
    }

    /// Creates a buffer pool sized to 25% of available system RAM.
    ///
    /// Minimum 1,000 frames to ensure useful caching even on low-memory
    /// systems.
    pub fn auto_sized(lru_k: usize, disk: Arc<DiskManager>) -> Self {
        let mut sys = System::new_all();
        sys.refresh_memory();

        let available_bytes = sys.available_memory() as usize;
        let target_bytes = available_bytes / 4;
        let num_frames = (target_bytes / PAGE_SIZE).max(1_000);

        Self::new(BufferPoolConfig { num_frames, lru_k }, disk)
    }

    /// Returns the number of frames in the pool.
    pub fn num_frames(&self) -> usize {
        self.config.num_frames
    }

    /// Returns the number of free frames.
    pub fn free_count(&self) -> usize {
        self.free_list.lock().len()
    }

    /// Returns the number of pages currently resident.
    pub fn page_count(&self) -> usize {
        self.page_table.len()
    }

    /// Checks if a page is resident.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.page_table.contains(page_id)
    }

    /// Returns the pin count of a resident page.
    pub fn pin_count_of(&self, page_id: PageId) -> Option<u32> {
        let frame_id = self.page_table.get(page_id)?;
        Some(self.frames[frame_id.0 as usize].pin_count())
    }

    /// Allocates a fresh page and returns it pinned and write-latched.
    ///
    /// The page contents are zeroed.
    pub fn new_page(&self) -> Result<WritePageGuard<'_>> {
        let page_id = self.disk.allocate_page()?;

        let miss = self.miss_lock.lock();
        let frame_id = self.claim_frame()?;
        let frame = &self.frames[frame_id.0 as usize];

        frame.reset();
        frame.set_page_id(page_id);
        frame.pin();
        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);
        drop(miss);

        let latch = frame.write_data();
        Ok(WritePageGuard::new(self, page_id, frame, latch))
    }

    /// Pins a page with shared (read) access.
    pub fn read_page(&self, page_id: PageId) -> Result<ReadPageGuard<'_>> {
        let frame_id = self.pin_page(page_id)?;
        let frame = &self.frames[frame_id.0 as usize];
        let latch = frame.read_data();
        Ok(ReadPageGuard::new(self, page_id, frame_id, latch))
    }

    /// Pins a page with exclusive (write) access.
    pub fn write_page(&self, page_id: PageId) -> Result<WritePageGuard<'_>> {
        let frame_id = self.pin_page(page_id)?;
        let frame = &self.frames[frame_id.0 as usize];
        let latch = frame.write_data();
        Ok(WritePageGuard::new(self, page_id, frame, latch))
    }

    /// Deallocates a page.
    ///
    /// Returns false if the page is pinned (deleting a pinned page is a
    /// caller bug; nothing is changed). The page must not be referenced
    /// afterwards.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let _miss = self.miss_lock.lock();

        if let Some(frame_id) = self.page_table.get(page_id) {
            let frame = &self.frames[frame_id.0 as usize];

            if frame.is_pinned() {
                return Ok(false);
            }

            let _ = self.page_table.remove(page_id);
            self.replacer.remove(frame_id);
            frame.reset();
            self.free_list.lock().push(frame_id);
        }

        self.disk.deallocate_page(page_id);
        Ok(true)
    }

    /// Writes a resident dirty page back to disk.
    ///
    /// Returns true if the page was written.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if let Some(frame_id) = self.page_table.get(page_id) {
            let frame = &self.frames[frame_id.0 as usize];
            if frame.is_dirty() {
                let data = frame.read_data();
                self.disk.write_page(page_id, &data)?;
                drop(data);
                frame.set_dirty(false);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Writes all resident dirty pages back to disk.
    ///
    /// Returns the number of pages written.
    pub fn flush_all(&self) -> Result<usize> {
        let mut resident = Vec::new();
        self.page_table.for_each(|page_id, _| {
            resident.push(page_id);
            true
        });

        let mut flushed = 0;
        for page_id in resident {
            if self.flush_page(page_id)? {
                flushed += 1;
            }
        }
        Ok(flushed)
    }

    /// Pins `page_id`, faulting it in from disk if not resident.
    fn pin_page(&self, page_id: PageId) -> Result<FrameId> {
        if !page_id.is_valid() {
            return Err(BasaltError::PageNotFound { page_id: page_id.0 });
        }

        loop {
            if let Some(frame_id) = self.page_table.get(page_id) {
                let frame = &self.frames[frame_id.0 as usize];
                frame.pin();
                if frame.page_id() == page_id {
                    self.replacer.record_access(frame_id);
                    self.replacer.set_evictable(frame_id, false);
                    return Ok(frame_id);
                }
                // Lost a race against eviction; undo the stray pin and retry.
                frame.unpin();
                continue;
            }

            let miss = self.miss_lock.lock();
            if self.page_table.get(page_id).is_some() {
                // Another thread faulted it in while we waited.
                continue;
            }

            let frame_id = self.claim_frame()?;
            let frame = &self.frames[frame_id.0 as usize];

            frame.reset();
            let data = self.disk.read_page(page_id).inspect_err(|_| {
                self.free_list.lock().push(frame_id);
            })?;
            frame.copy_from(&data);
            frame.set_page_id(page_id);
            frame.pin();
            self.page_table.insert(page_id, frame_id);
            self.replacer.record_access(frame_id);
            self.replacer.set_evictable(frame_id, false);
            drop(miss);

            return Ok(frame_id);
        }
    }

    /// Claims a frame for a new resident page. Caller must hold `miss_lock`.
    ///
    /// Tries the free list first, then evicts the LRU-K victim, writing it
    /// back if dirty.
    fn claim_frame(&self) -> Result<FrameId> {
        if let Some(frame_id) = self.free_list.lock().pop() {
            return Ok(frame_id);
        }

        while let Some(frame_id) = self.replacer.evict() {
            let frame = &self.frames[frame_id.0 as usize];

            if frame.pin_count() != 0 {
                // Re-pinned after it was marked evictable. evict() already
                // forgot the frame, so track it again or it can never be
                // chosen as a victim after its next unpin.
                self.requeue_skipped_victim(frame, frame_id);
                continue;
            }

            let old_page = frame.page_id();
            if old_page.is_valid() {
                let _ = self.page_table.remove(old_page);
            }
            frame.set_page_id(PageId::INVALID);

            if frame.pin_count() != 0 {
                // A reader pinned through a stale page-table entry between
                // the check and the unmap; hand the frame back.
                frame.set_page_id(old_page);
                if old_page.is_valid() {
                    self.page_table.insert(old_page, frame_id);
                }
                self.requeue_skipped_victim(frame, frame_id);
                continue;
            }

            if frame.is_dirty() && old_page.is_valid() {
                let data = frame.read_data();
                self.disk.write_page(old_page, &data)?;
                drop(data);
                frame.set_dirty(false);
            }

            return Ok(frame_id);
        }

        Err(BasaltError::PoolExhausted)
    }

    /// Re-registers a victim that turned out to be pinned when evicted.
    ///
    /// If the pin holder already released between the eviction and this call,
    /// its set_evictable was a no-op on the forgotten frame, so finish the
    /// job here.
    fn requeue_skipped_victim(&self, frame: &Frame, frame_id: FrameId) {
        self.replacer.record_access(frame_id);
        if frame.pin_count() == 0 {
            self.replacer.set_evictable(frame_id, true);
        }
    }

    /// Returns a guard's pin. Called from guard destructors.
    pub(crate) fn unpin_frame(&self, frame_id: FrameId) {
        let frame = &self.frames[frame_id.0 as usize];
        if frame.unpin() == 0 {
            self.replacer.set_evictable(frame_id, true);
        }
    }
}
