//! Lock-free page table mapping resident page IDs to frame IDs.

use crate::frame::FrameId;
use basalt_common::page::PageId;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Sentinel for an empty key slot. `PageId::INVALID` is never inserted, so
/// the all-ones pattern is free to use.
const EMPTY_KEY: u32 = u32::MAX;

/// Sentinel for a deleted key slot (tombstone).
const TOMBSTONE_KEY: u32 = u32::MAX - 1;

/// Sentinel for an empty value slot.
const EMPTY_FRAME: u32 = u32::MAX;

/// Open-addressing hash table with linear probing and atomic slots.
///
/// Lookups are lock-free. The buffer pool serializes insert/remove through
/// its miss path, so slot claiming only needs a single CAS per probe.
pub struct PageTable {
    keys: Box<[AtomicU32]>,
    values: Box<[AtomicU32]>,
    mask: usize,
    len: AtomicUsize,
}

impl PageTable {
    /// Creates a page table sized for the given number of frames.
    pub fn new(capacity: usize) -> Self {
        // 2x capacity for ~50% load factor, minimum 1024 slots.
        let size = (capacity * 2).next_power_of_two().max(1024);

        let keys: Box<[AtomicU32]> = (0..size).map(|_| AtomicU32::new(EMPTY_KEY)).collect();
        let values: Box<[AtomicU32]> = (0..size).map(|_| AtomicU32::new(EMPTY_FRAME)).collect();

        Self {
            keys,
            values,
            mask: size - 1,
            len: AtomicUsize::new(0),
        }
    }

    #[inline(always)]
    fn slot_of(&self, page_id: PageId) -> usize {
        // Fibonacci hashing spreads sequential page ids across the table.
        let h = (page_id.0 as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        (h >> 32) as usize & self.mask
    }

    /// Looks up the frame holding `page_id`.
    pub fn get(&self, page_id: PageId) -> Option<FrameId> {
        debug_assert!(page_id.is_valid());
        let mut slot = self.slot_of(page_id);

        loop {
            let key = self.keys[slot].load(Ordering::Acquire);
            if key == page_id.0 {
                let value = self.values[slot].load(Ordering::Acquire);
                if value != EMPTY_FRAME {
                    return Some(FrameId(value));
                }
                return None;
            }
            if key == EMPTY_KEY {
                return None;
            }
            slot = (slot + 1) & self.mask;
        }
    }

    /// Returns true if `page_id` is resident.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.get(page_id).is_some()
    }

    /// Maps `page_id` to `frame_id`, overwriting any existing mapping.
    pub fn insert(&self, page_id: PageId, frame_id: FrameId) {
        debug_assert!(page_id.is_valid() && frame_id.is_valid());
        let mut slot = self.slot_of(page_id);

        loop {
            let key = self.keys[slot].load(Ordering::Acquire);

            if key == page_id.0 {
                self.values[slot].store(frame_id.0, Ordering::Release);
                return;
            }

            if key == EMPTY_KEY || key == TOMBSTONE_KEY {
                if self.keys[slot]
                    .compare_exchange(key, page_id.0, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    self.values[slot].store(frame_id.0, Ordering::Release);
                    self.len.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                // Lost the slot; re-examine it.
                continue;
            }

            slot = (slot + 1) & self.mask;
        }
    }

    /// Removes the mapping for `page_id`. Returns the frame it mapped to.
    pub fn remove(&self, page_id: PageId) -> Option<FrameId> {
        debug_assert!(page_id.is_valid());
        let mut slot = self.slot_of(page_id);

        loop {
            let key = self.keys[slot].load(Ordering::Acquire);

            if key == page_id.0 {
                let value = self.values[slot].swap(EMPTY_FRAME, Ordering::AcqRel);
                self.keys[slot].store(TOMBSTONE_KEY, Ordering::Release);
                self.len.fetch_sub(1, Ordering::Relaxed);
                if value != EMPTY_FRAME {
                    return Some(FrameId(value));
                }
                return None;
            }

            if key == EMPTY_KEY {
                return None;
            }

            slot = (slot + 1) & self.mask;
        }
    }

    /// Number of resident pages.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Returns true if no pages are resident.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visits every mapping. The callback returns false to stop early.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(PageId, FrameId) -> bool,
    {
        for slot in 0..self.keys.len() {
            let key = self.keys[slot].load(Ordering::Acquire);
            if key == EMPTY_KEY || key == TOMBSTONE_KEY {
                continue;
            }
            let value = self.values[slot].load(Ordering::Acquire);
            if value == EMPTY_FRAME {
                continue;
            }
            if !f(PageId(key), FrameId(value)) {
                return;
            }
        }
    }
}
