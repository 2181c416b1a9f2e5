//! Page-based B+ tree index with latch-crabbed traversal.

use crate::btree::iterator::IndexIterator;
use crate::btree::page::{
    internal_capacity, leaf_capacity, page_kind, page_max_size, page_size, HeaderPage,
    HeaderPageMut, InternalPage, InternalPageMut, LeafPage, LeafPageMut,
};
use crate::key::{IndexKey, KeyComparator};
use basalt_buffer::{BufferPoolManager, WritePageGuard};
use basalt_common::config::IndexConfig;
use basalt_common::page::{PageId, PageKind};
use basalt_common::{BasaltError, Result, Rid};
use std::cmp::Ordering;
use std::marker::PhantomData;
use std::sync::Arc;

/// Minimum entries of a non-root page: half the maximum, rounded up.
///
/// Computed from the max size each page stores in its header, so pages
/// written under one configuration stay consistent if the tree is reopened
/// with another.
#[inline]
fn min_size(max_size: usize) -> usize {
    (max_size + 1) / 2
}

fn corrupted(page_id: PageId, reason: &str) -> BasaltError {
    BasaltError::PageCorrupted {
        page_id: page_id.0,
        reason: reason.to_string(),
    }
}

/// Write guards along the path from the root to the current node, plus the
/// header guard, with the child index followed out of each node.
///
/// When a freshly latched child is proven safe for the operation, every
/// ancestor latch (header included) is released; the guard stack then holds
/// only the part of the spine a structural change could still reach.
struct Context<'a> {
    header: Option<WritePageGuard<'a>>,
    path: Vec<(WritePageGuard<'a>, usize)>,
}

impl Context<'_> {
    fn release_ancestors(&mut self) {
        self.header = None;
        self.path.clear();
    }
}

/// A unique-key B+ tree mapping fixed-width keys to record identifiers.
///
/// The tree owns nothing but a header page id; all pages live in the buffer
/// pool. Operations on a single tree are linearizable: readers crab down
/// with shared latches, writers take the header latch exclusively and keep
/// the spine latched until the modification is proven local.
pub struct BPlusTree<K: IndexKey, C: KeyComparator<K>> {
    bpm: Arc<BufferPoolManager>,
    comparator: C,
    leaf_max_size: u32,
    internal_max_size: u32,
    header_page_id: PageId,
    _key: PhantomData<K>,
}

impl<K: IndexKey, C: KeyComparator<K>> BPlusTree<K, C> {
    /// Creates a new empty tree, allocating its header page.
    pub fn create(bpm: Arc<BufferPoolManager>, comparator: C, config: IndexConfig) -> Result<Self> {
        let (leaf_max_size, internal_max_size) = Self::clamp_sizes(&config);

        let mut header_guard = bpm.new_page()?;
        let header_page_id = header_guard.page_id();
        HeaderPageMut::new(header_guard.data_mut()).set_root_page_id(PageId::INVALID);
        drop(header_guard);

        Ok(Self {
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
            header_page_id,
            _key: PhantomData,
        })
    }

    /// Reattaches to an existing tree by its durable header page id.
    pub fn open(
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        config: IndexConfig,
        header_page_id: PageId,
    ) -> Result<Self> {
        let (leaf_max_size, internal_max_size) = Self::clamp_sizes(&config);

        // Fault the header in early so a bad id fails here, not mid-query.
        drop(bpm.read_page(header_page_id)?);

        Ok(Self {
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
            header_page_id,
            _key: PhantomData,
        })
    }

    /// Resolves configured sizes against the physical slot capacity.
    ///
    /// Max sizes are clamped to capacity - 1 so the transient one-slot
    /// overflow inside the split loop always fits in the page.
    fn clamp_sizes(config: &IndexConfig) -> (u32, u32) {
        let leaf_cap = leaf_capacity(K::WIDTH) as u32;
        let internal_cap = internal_capacity(K::WIDTH) as u32;
        let leaf = config
            .leaf_max_size
            .unwrap_or(leaf_cap - 1)
            .clamp(2, leaf_cap - 1);
        let internal = config
            .internal_max_size
            .unwrap_or(internal_cap - 1)
            .clamp(3, internal_cap - 1);
        (leaf, internal)
    }

    /// The durable id of this tree's header page.
    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    /// The buffer pool this tree lives in.
    pub fn buffer_pool(&self) -> &Arc<BufferPoolManager> {
        &self.bpm
    }

    /// The current root page id, `INVALID` when the tree is empty.
    pub fn root_page_id(&self) -> Result<PageId> {
        let guard = self.bpm.read_page(self.header_page_id)?;
        Ok(HeaderPage::new(guard.data()).root_page_id())
    }

    /// Returns true if the tree holds no keys.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(!self.root_page_id()?.is_valid())
    }

    // =======================================================================
    // Search
    // =======================================================================

    /// Point lookup. Returns the RID paired with `key`, if present.
    pub fn get_value(&self, key: &K) -> Result<Option<Rid>> {
        let header_guard = self.bpm.read_page(self.header_page_id)?;
        let root_id = HeaderPage::new(header_guard.data()).root_page_id();
        if !root_id.is_valid() {
            return Ok(None);
        }

        let mut guard = self.bpm.read_page(root_id)?;
        drop(header_guard);

        loop {
            match page_kind(guard.data()) {
                PageKind::Leaf => {
                    let leaf = LeafPage::<K>::new(guard.data());
                    return Ok(leaf
                        .key_index(key, &self.comparator)
                        .map(|index| leaf.value_at(index)));
                }
                PageKind::Internal => {
                    let internal = InternalPage::<K>::new(guard.data());
                    let child_id = internal.value_at(internal.child_index(key, &self.comparator));
                    // Latch the child before releasing the parent.
                    let child_guard = self.bpm.read_page(child_id)?;
                    guard = child_guard;
                }
                PageKind::Invalid => {
                    return Err(corrupted(guard.page_id(), "untagged page on search path"))
                }
            }
        }
    }

    // =======================================================================
    // Insert
    // =======================================================================

    /// Inserts a key/RID pair. Returns false (without mutating) if the key
    /// already exists.
    pub fn insert(&self, key: &K, value: &Rid) -> Result<bool> {
        let mut header_guard = self.bpm.write_page(self.header_page_id)?;
        let root_id = HeaderPage::new(header_guard.data()).root_page_id();

        if !root_id.is_valid() {
            // First insert: the root starts as a single leaf.
            let mut leaf_guard = self.bpm.new_page()?;
            let leaf_id = leaf_guard.page_id();
            let mut leaf = LeafPageMut::<K>::new(leaf_guard.data_mut());
            leaf.init(self.leaf_max_size);
            leaf.insert(0, key, value);
            HeaderPageMut::new(header_guard.data_mut()).set_root_page_id(leaf_id);
            return Ok(true);
        }

        let mut ctx = Context {
            header: Some(header_guard),
            path: Vec::new(),
        };
        let mut cur = self.bpm.write_page(root_id)?;

        loop {
            let insert_safe = page_size(cur.data()) < page_max_size(cur.data());
            if insert_safe {
                ctx.release_ancestors();
            }
            match page_kind(cur.data()) {
                PageKind::Leaf => break,
                PageKind::Internal => {
                    let internal = InternalPage::<K>::new(cur.data());
                    let index = internal.child_index(key, &self.comparator);
                    let child_id = internal.value_at(index);
                    ctx.path.push((cur, index));
                    cur = self.bpm.write_page(child_id)?;
                }
                PageKind::Invalid => {
                    return Err(corrupted(cur.page_id(), "untagged page on insert path"))
                }
            }
        }

        // Place the pair, refusing duplicates.
        let pos = {
            let leaf = LeafPage::<K>::new(cur.data());
            let pos = leaf.lower_bound(key, &self.comparator);
            if pos < leaf.size()
                && self.comparator.compare(&leaf.key_at(pos), key) == Ordering::Equal
            {
                return Ok(false);
            }
            pos
        };
        LeafPageMut::<K>::new(cur.data_mut()).insert(pos, key, value);

        // Split while the current page is over its max size.
        loop {
            if page_size(cur.data()) <= page_max_size(cur.data()) {
                return Ok(true);
            }

            let (separator, right_id) = self.split_page(&mut cur)?;

            match ctx.path.pop() {
                Some((mut parent, index)) => {
                    let mut p = InternalPageMut::<K>::new(parent.data_mut());
                    p.insert_value(index + 1, right_id);
                    p.insert_key(index + 1, &separator);
                    cur = parent;
                }
                None => {
                    // The root split: grow the tree by one level.
                    let mut root_guard = self.bpm.new_page()?;
                    let new_root_id = root_guard.page_id();
                    {
                        let mut root = InternalPageMut::<K>::new(root_guard.data_mut());
                        root.init(self.internal_max_size);
                        root.set_values(&[cur.page_id(), right_id]);
                        root.set_keys(std::slice::from_ref(&separator));
                    }
                    let header = ctx
                        .header
                        .as_mut()
                        .ok_or_else(|| corrupted(new_root_id, "root split without header latch"))?;
                    HeaderPageMut::new(header.data_mut()).set_root_page_id(new_root_id);
                    return Ok(true);
                }
            }
        }
    }

    /// Splits an overflowing page, keeping the lower half in place and
    /// moving the upper half to a fresh right sibling. Returns the separator
    /// to promote and the new sibling's id.
    fn split_page(&self, cur: &mut WritePageGuard<'_>) -> Result<(K, PageId)> {
        let mut right_guard = self.bpm.new_page()?;
        let right_id = right_guard.page_id();

        let separator = match page_kind(cur.data()) {
            PageKind::Leaf => {
                let (keys, values, next, max) = {
                    let left = LeafPage::<K>::new(cur.data());
                    (left.keys(), left.values(), left.next_page_id(), left.max_size())
                };
                let min = min_size(max);
                // The promoted separator is the right sibling's first key.
                let separator = keys[min];
                {
                    let mut right = LeafPageMut::<K>::new(right_guard.data_mut());
                    right.init(max as u32);
                    right.set_kvs(&keys[min..], &values[min..]);
                    right.set_next_page_id(next);
                }
                let mut left = LeafPageMut::<K>::new(cur.data_mut());
                left.truncate(min);
                left.set_next_page_id(right_id);
                separator
            }
            PageKind::Internal => {
                let (keys, values, max) = {
                    let page = InternalPage::<K>::new(cur.data());
                    (page.keys(), page.values(), page.max_size())
                };
                let min = min_size(max);
                // The middle key is promoted and removed from both halves.
                let separator = keys[min];
                {
                    let mut right = InternalPageMut::<K>::new(right_guard.data_mut());
                    right.init(max as u32);
                    right.set_values(&values[min..]);
                    right.set_keys(&keys[min + 1..]);
                }
                InternalPageMut::<K>::new(cur.data_mut()).truncate(min);
                separator
            }
            PageKind::Invalid => return Err(corrupted(cur.page_id(), "splitting untagged page")),
        };

        Ok((separator, right_id))
    }

    // =======================================================================
    // Remove
    // =======================================================================

    /// Deletes `key` and its RID. Deleting an absent key is a no-op.
    pub fn remove(&self, key: &K) -> Result<()> {
        let header_guard = self.bpm.write_page(self.header_page_id)?;
        let root_id = HeaderPage::new(header_guard.data()).root_page_id();
        if !root_id.is_valid() {
            return Ok(());
        }

        let mut ctx = Context {
            header: Some(header_guard),
            path: Vec::new(),
        };
        let mut cur = self.bpm.write_page(root_id)?;
        let mut cur_is_root = true;

        loop {
            let size = page_size(cur.data());
            match page_kind(cur.data()) {
                PageKind::Leaf => {
                    // A root leaf only needs the header if it may empty out.
                    let floor = if cur_is_root {
                        1
                    } else {
                        min_size(page_max_size(cur.data()))
                    };
                    if size > floor {
                        ctx.release_ancestors();
                    }
                    break;
                }
                PageKind::Internal => {
                    // A root with three children survives one child merge.
                    let floor = if cur_is_root {
                        2
                    } else {
                        min_size(page_max_size(cur.data()))
                    };
                    if size > floor {
                        ctx.release_ancestors();
                    }
                    let internal = InternalPage::<K>::new(cur.data());
                    let index = internal.child_index(key, &self.comparator);
                    let child_id = internal.value_at(index);
                    ctx.path.push((cur, index));
                    cur = self.bpm.write_page(child_id)?;
                    cur_is_root = false;
                }
                PageKind::Invalid => {
                    return Err(corrupted(cur.page_id(), "untagged page on remove path"))
                }
            }
        }

        // Remove the slot; absent keys are a silent no-op.
        let pos = {
            let leaf = LeafPage::<K>::new(cur.data());
            match leaf.key_index(key, &self.comparator) {
                Some(pos) => pos,
                None => return Ok(()),
            }
        };
        LeafPageMut::<K>::new(cur.data_mut()).remove(pos);

        // Rebalance upward while pages underflow.
        loop {
            let kind = page_kind(cur.data());
            let size = page_size(cur.data());

            let Some((parent, child_index)) = ctx.path.pop() else {
                // `cur` is the highest retained node. Root transitions only
                // apply when it really is the root (header still latched).
                if let Some(header) = ctx.header.as_mut() {
                    if kind == PageKind::Leaf && size == 0 {
                        HeaderPageMut::new(header.data_mut()).set_root_page_id(PageId::INVALID);
                        let dead = cur.page_id();
                        drop(cur);
                        self.bpm.delete_page(dead)?;
                    } else if kind == PageKind::Internal && size == 1 {
                        // Collapse the root by one level.
                        let child_id = InternalPage::<K>::new(cur.data()).value_at(0);
                        HeaderPageMut::new(header.data_mut()).set_root_page_id(child_id);
                        let dead = cur.page_id();
                        drop(cur);
                        self.bpm.delete_page(dead)?;
                    }
                }
                return Ok(());
            };

            if kind == PageKind::Invalid {
                return Err(corrupted(cur.page_id(), "untagged page on rebalance path"));
            }
            if size >= min_size(page_max_size(cur.data())) {
                return Ok(());
            }

            let merged_parent = match kind {
                PageKind::Leaf => self.rebalance_leaf(cur, parent, child_index)?,
                _ => self.rebalance_internal(cur, parent, child_index)?,
            };
            match merged_parent {
                Some(parent) => cur = parent,
                None => return Ok(()),
            }
        }
    }

    /// Fixes an underfull leaf at `child_index` within `parent`: borrow from
    /// a sibling with spare entries, else merge (preferring the left
    /// sibling). Returns the parent guard when a merge removed a child and
    /// the parent must be re-checked.
    fn rebalance_leaf<'a>(
        &self,
        mut cur: WritePageGuard<'a>,
        mut parent: WritePageGuard<'a>,
        child_index: usize,
    ) -> Result<Option<WritePageGuard<'a>>> {
        let parent_size = page_size(parent.data());

        let mut left_guard = if child_index > 0 {
            let left_id = InternalPage::<K>::new(parent.data()).value_at(child_index - 1);
            Some(self.bpm.write_page(left_id)?)
        } else {
            None
        };

        if let Some(lg) = left_guard.as_mut() {
            let left_size = page_size(lg.data());
            // A sibling spares an entry only when above its own stored
            // minimum.
            if left_size > min_size(page_max_size(lg.data())) {
                // Rotate the left sibling's last pair in front of us; its key
                // becomes the separator routing to this leaf.
                let (moved_key, moved_value) = {
                    let left = LeafPage::<K>::new(lg.data());
                    (left.key_at(left_size - 1), left.value_at(left_size - 1))
                };
                LeafPageMut::<K>::new(lg.data_mut()).remove(left_size - 1);
                LeafPageMut::<K>::new(cur.data_mut()).insert(0, &moved_key, &moved_value);
                InternalPageMut::<K>::new(parent.data_mut()).set_key_at(child_index, &moved_key);
                return Ok(None);
            }
        }

        let mut right_guard = if child_index + 1 < parent_size {
            let right_id = InternalPage::<K>::new(parent.data()).value_at(child_index + 1);
            Some(self.bpm.write_page(right_id)?)
        } else {
            None
        };

        if let Some(rg) = right_guard.as_mut() {
            if page_size(rg.data()) > min_size(page_max_size(rg.data())) {
                // Rotate the right sibling's first pair onto our end and
                // re-route its separator to its new first key.
                let (moved_key, moved_value) = {
                    let right = LeafPage::<K>::new(rg.data());
                    (right.key_at(0), right.value_at(0))
                };
                LeafPageMut::<K>::new(rg.data_mut()).remove(0);
                let cur_size = page_size(cur.data());
                LeafPageMut::<K>::new(cur.data_mut()).insert(cur_size, &moved_key, &moved_value);
                let new_first = LeafPage::<K>::new(rg.data()).key_at(0);
                InternalPageMut::<K>::new(parent.data_mut())
                    .set_key_at(child_index + 1, &new_first);
                return Ok(None);
            }
        }

        if let Some(mut lg) = left_guard {
            // Left absorbs us; the chain skips the dead page.
            let (keys, values, next) = {
                let c = LeafPage::<K>::new(cur.data());
                (c.keys(), c.values(), c.next_page_id())
            };
            {
                let mut left = LeafPageMut::<K>::new(lg.data_mut());
                let left_size = left.as_read().size();
                left.insert_range(left_size, &keys, &values);
                left.set_next_page_id(next);
            }
            {
                let mut p = InternalPageMut::<K>::new(parent.data_mut());
                p.remove_key(child_index);
                p.remove_value(child_index);
            }
            let dead = cur.page_id();
            drop(cur);
            drop(right_guard);
            drop(lg);
            self.bpm.delete_page(dead)?;
            Ok(Some(parent))
        } else if let Some(mut rg) = right_guard {
            // We absorb the right sibling.
            let (keys, values, next) = {
                let r = LeafPage::<K>::new(rg.data());
                (r.keys(), r.values(), r.next_page_id())
            };
            {
                let mut c = LeafPageMut::<K>::new(cur.data_mut());
                let cur_size = c.as_read().size();
                c.insert_range(cur_size, &keys, &values);
                c.set_next_page_id(next);
            }
            {
                let mut p = InternalPageMut::<K>::new(parent.data_mut());
                p.remove_key(child_index + 1);
                p.remove_value(child_index + 1);
            }
            let dead = rg.page_id();
            drop(rg);
            drop(cur);
            self.bpm.delete_page(dead)?;
            Ok(Some(parent))
        } else {
            Err(corrupted(
                parent.page_id(),
                "internal page has a lone leaf child",
            ))
        }
    }

    /// Fixes an underfull internal page: borrow a child through a separator
    /// rotation, else merge with a sibling, pulling the parent's separator
    /// down between the halves.
    fn rebalance_internal<'a>(
        &self,
        mut cur: WritePageGuard<'a>,
        mut parent: WritePageGuard<'a>,
        child_index: usize,
    ) -> Result<Option<WritePageGuard<'a>>> {
        let parent_size = page_size(parent.data());

        let mut left_guard = if child_index > 0 {
            let left_id = InternalPage::<K>::new(parent.data()).value_at(child_index - 1);
            Some(self.bpm.write_page(left_id)?)
        } else {
            None
        };

        if let Some(lg) = left_guard.as_mut() {
            let left_size = page_size(lg.data());
            // A sibling spares a child only when above its own stored
            // minimum.
            if left_size > min_size(page_max_size(lg.data())) {
                // The left sibling's last child moves over; the separator
                // rotates down into us and the sibling's last key rotates up.
                let (moved_key, moved_child) = {
                    let left = InternalPage::<K>::new(lg.data());
                    (left.key_at(left_size - 1), left.value_at(left_size - 1))
                };
                let separator = InternalPage::<K>::new(parent.data()).key_at(child_index);
                {
                    let mut c = InternalPageMut::<K>::new(cur.data_mut());
                    c.insert_value(0, moved_child);
                    c.insert_key(1, &separator);
                }
                InternalPageMut::<K>::new(parent.data_mut()).set_key_at(child_index, &moved_key);
                {
                    let mut l = InternalPageMut::<K>::new(lg.data_mut());
                    l.remove_key(left_size - 1);
                    l.remove_value(left_size - 1);
                }
                return Ok(None);
            }
        }

        let mut right_guard = if child_index + 1 < parent_size {
            let right_id = InternalPage::<K>::new(parent.data()).value_at(child_index + 1);
            Some(self.bpm.write_page(right_id)?)
        } else {
            None
        };

        if let Some(rg) = right_guard.as_mut() {
            let right_size = page_size(rg.data());
            if right_size > min_size(page_max_size(rg.data())) {
                let moved_child = InternalPage::<K>::new(rg.data()).value_at(0);
                let separator = InternalPage::<K>::new(parent.data()).key_at(child_index + 1);
                let cur_size = page_size(cur.data());
                {
                    let mut c = InternalPageMut::<K>::new(cur.data_mut());
                    c.insert_value(cur_size, moved_child);
                    c.insert_key(cur_size, &separator);
                }
                let new_separator = InternalPage::<K>::new(rg.data()).key_at(1);
                InternalPageMut::<K>::new(parent.data_mut())
                    .set_key_at(child_index + 1, &new_separator);
                {
                    let mut r = InternalPageMut::<K>::new(rg.data_mut());
                    r.remove_key(1);
                    r.remove_value(0);
                }
                return Ok(None);
            }
        }

        if let Some(mut lg) = left_guard {
            // Left absorbs us: its children, the demoted separator, then our
            // keys and children.
            let separator = InternalPage::<K>::new(parent.data()).key_at(child_index);
            let (cur_keys, cur_values) = {
                let c = InternalPage::<K>::new(cur.data());
                (c.keys(), c.values())
            };
            let (mut new_keys, mut new_values) = {
                let left = InternalPage::<K>::new(lg.data());
                (left.keys()[1..].to_vec(), left.values())
            };
            new_keys.push(separator);
            new_keys.extend_from_slice(&cur_keys[1..]);
            new_values.extend_from_slice(&cur_values);
            {
                let mut left = InternalPageMut::<K>::new(lg.data_mut());
                left.set_values(&new_values);
                left.set_keys(&new_keys);
            }
            {
                let mut p = InternalPageMut::<K>::new(parent.data_mut());
                p.remove_key(child_index);
                p.remove_value(child_index);
            }
            let dead = cur.page_id();
            drop(cur);
            drop(right_guard);
            drop(lg);
            self.bpm.delete_page(dead)?;
            Ok(Some(parent))
        } else if let Some(mut rg) = right_guard {
            let separator = InternalPage::<K>::new(parent.data()).key_at(child_index + 1);
            let (right_keys, right_values) = {
                let r = InternalPage::<K>::new(rg.data());
                (r.keys(), r.values())
            };
            let (mut new_keys, mut new_values) = {
                let c = InternalPage::<K>::new(cur.data());
                (c.keys()[1..].to_vec(), c.values())
            };
            new_keys.push(separator);
            new_keys.extend_from_slice(&right_keys[1..]);
            new_values.extend_from_slice(&right_values);
            {
                let mut c = InternalPageMut::<K>::new(cur.data_mut());
                c.set_values(&new_values);
                c.set_keys(&new_keys);
            }
            {
                let mut p = InternalPageMut::<K>::new(parent.data_mut());
                p.remove_key(child_index + 1);
                p.remove_value(child_index + 1);
            }
            let dead = rg.page_id();
            drop(rg);
            drop(cur);
            self.bpm.delete_page(dead)?;
            Ok(Some(parent))
        } else {
            Err(corrupted(
                parent.page_id(),
                "internal page has a lone internal child",
            ))
        }
    }

    // =======================================================================
    // Iteration
    // =======================================================================

    /// Iterator positioned at the smallest key.
    pub fn begin(&self) -> Result<IndexIterator<K>> {
        let header_guard = self.bpm.read_page(self.header_page_id)?;
        let root_id = HeaderPage::new(header_guard.data()).root_page_id();
        if !root_id.is_valid() {
            return Ok(IndexIterator::end(self.bpm.clone()));
        }

        let mut guard = self.bpm.read_page(root_id)?;
        drop(header_guard);

        loop {
            match page_kind(guard.data()) {
                PageKind::Leaf => {
                    let page_id = guard.page_id();
                    return Ok(IndexIterator::new(self.bpm.clone(), Some((page_id, 0))));
                }
                PageKind::Internal => {
                    let child_id = InternalPage::<K>::new(guard.data()).value_at(0);
                    let child_guard = self.bpm.read_page(child_id)?;
                    guard = child_guard;
                }
                PageKind::Invalid => {
                    return Err(corrupted(guard.page_id(), "untagged page on scan path"))
                }
            }
        }
    }

    /// Iterator positioned at the first key >= `key`.
    pub fn begin_at(&self, key: &K) -> Result<IndexIterator<K>> {
        let header_guard = self.bpm.read_page(self.header_page_id)?;
        let root_id = HeaderPage::new(header_guard.data()).root_page_id();
        if !root_id.is_valid() {
            return Ok(IndexIterator::end(self.bpm.clone()));
        }

        let mut guard = self.bpm.read_page(root_id)?;
        drop(header_guard);

        loop {
            match page_kind(guard.data()) {
                PageKind::Leaf => {
                    let leaf = LeafPage::<K>::new(guard.data());
                    let slot = leaf.lower_bound(key, &self.comparator);
                    let page_id = guard.page_id();
                    // A past-the-end slot resolves through the leaf chain on
                    // the first advance.
                    return Ok(IndexIterator::new(self.bpm.clone(), Some((page_id, slot))));
                }
                PageKind::Internal => {
                    let internal = InternalPage::<K>::new(guard.data());
                    let child_id = internal.value_at(internal.child_index(key, &self.comparator));
                    let child_guard = self.bpm.read_page(child_id)?;
                    guard = child_guard;
                }
                PageKind::Invalid => {
                    return Err(corrupted(guard.page_id(), "untagged page on scan path"))
                }
            }
        }
    }

    /// The exhausted iterator.
    pub fn end(&self) -> IndexIterator<K> {
        IndexIterator::end(self.bpm.clone())
    }
}
