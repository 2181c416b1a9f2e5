//! Forward iterator over the leaf chain.

use crate::btree::page::LeafPage;
use crate::key::IndexKey;
use basalt_buffer::BufferPoolManager;
use basalt_common::page::PageId;
use basalt_common::Rid;
use std::marker::PhantomData;
use std::sync::Arc;

/// Iterator yielding (key, RID) pairs in ascending key order.
///
/// The cursor is a (leaf page, slot) position; `None` is the end sentinel.
/// Each step read-latches the current leaf, copies the pair out, and
/// releases the latch before returning, so no latch is held between calls.
pub struct IndexIterator<K: IndexKey> {
    bpm: Arc<BufferPoolManager>,
    cursor: Option<(PageId, usize)>,
    _key: PhantomData<K>,
}

impl<K: IndexKey> IndexIterator<K> {
    pub(crate) fn new(bpm: Arc<BufferPoolManager>, cursor: Option<(PageId, usize)>) -> Self {
        Self {
            bpm,
            cursor,
            _key: PhantomData,
        }
    }

    pub(crate) fn end(bpm: Arc<BufferPoolManager>) -> Self {
        Self::new(bpm, None)
    }

    /// Returns true once the iterator is exhausted.
    pub fn is_end(&self) -> bool {
        self.cursor.is_none()
    }
}

impl<K: IndexKey> Iterator for IndexIterator<K> {
    type Item = (K, Rid);

    fn next(&mut self) -> Option<(K, Rid)> {
        loop {
            let (page_id, index) = self.cursor?;
            let guard = match self.bpm.read_page(page_id) {
                Ok(guard) => guard,
                Err(_) => {
                    self.cursor = None;
                    return None;
                }
            };
            let leaf = LeafPage::<K>::new(guard.data());

            if index >= leaf.size() {
                // Past the last slot (or the leaf shrank); follow the chain.
                let next = leaf.next_page_id();
                self.cursor = next.is_valid().then_some((next, 0));
                continue;
            }

            let item = (leaf.key_at(index), leaf.value_at(index));

            if index + 1 < leaf.size() {
                self.cursor = Some((page_id, index + 1));
            } else {
                let next = leaf.next_page_id();
                self.cursor = next.is_valid().then_some((next, 0));
            }

            return Some(item);
        }
    }
}
