//! Scoped page guards.
//!
//! A guard owns both the pin and the page latch for its lifetime. Dropping
//! it releases the latch first, then returns the pin, exactly once. Guards
//! are movable but not copyable; moving one transfers both resources.

use crate::frame::{Frame, FrameId};
use crate::pool::BufferPoolManager;
use basalt_common::page::{PageId, PAGE_SIZE};
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use std::mem::ManuallyDrop;

/// Shared (read-latched) access to a pinned page.
pub struct ReadPageGuard<'a> {
    pool: &'a BufferPoolManager,
    page_id: PageId,
    frame_id: FrameId,
    latch: ManuallyDrop<RwLockReadGuard<'a, Box<[u8; PAGE_SIZE]>>>,
}

impl<'a> ReadPageGuard<'a> {
    pub(crate) fn new(
        pool: &'a BufferPoolManager,
        page_id: PageId,
        frame_id: FrameId,
        latch: RwLockReadGuard<'a, Box<[u8; PAGE_SIZE]>>,
    ) -> Self {
        Self {
            pool,
            page_id,
            frame_id,
            latch: ManuallyDrop::new(latch),
        }
    }

    /// Returns the guarded page's ID.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the page contents.
    #[inline]
    pub fn data(&self) -> &[u8; PAGE_SIZE] {
        &self.latch
    }
}

impl Drop for ReadPageGuard<'_> {
    fn drop(&mut self) {
        // Unlatch, then unpin.
        unsafe { ManuallyDrop::drop(&mut self.latch) };
        self.pool.unpin_frame(self.frame_id);
    }
}

/// Exclusive (write-latched) access to a pinned page.
pub struct WritePageGuard<'a> {
    pool: &'a BufferPoolManager,
    page_id: PageId,
    frame: &'a Frame,
    latch: ManuallyDrop<RwLockWriteGuard<'a, Box<[u8; PAGE_SIZE]>>>,
}

impl<'a> WritePageGuard<'a> {
    pub(crate) fn new(
        pool: &'a BufferPoolManager,
        page_id: PageId,
        frame: &'a Frame,
        latch: RwLockWriteGuard<'a, Box<[u8; PAGE_SIZE]>>,
    ) -> Self {
        Self {
            pool,
            page_id,
            frame,
            latch: ManuallyDrop::new(latch),
        }
    }

    /// Returns the guarded page's ID.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the page contents.
    #[inline]
    pub fn data(&self) -> &[u8; PAGE_SIZE] {
        &self.latch
    }

    /// Returns mutable page contents and marks the frame dirty.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        self.frame.set_dirty(true);
        &mut self.latch
    }
}

impl Drop for WritePageGuard<'_> {
    fn drop(&mut self) {
        // Unlatch, then unpin.
        unsafe { ManuallyDrop::drop(&mut self.latch) };
        self.pool.unpin_frame(self.frame.frame_id());
    }
}
