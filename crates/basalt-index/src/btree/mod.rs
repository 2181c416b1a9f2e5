//! Disk-resident B+ tree built on the buffer pool.
//!
//! All data lives in leaf pages linked into a singly-linked chain for
//! forward scans; internal pages route on separator keys. A header page
//! holds the root id, so a tree survives process restarts given its header
//! page id. Traversal uses latch crabbing: readers hold at most two page
//! latches, writers retain the spine until the operation is proven local.

pub mod index;
pub mod iterator;
pub mod page;

pub use index::BPlusTree;
pub use iterator::IndexIterator;
pub use page::{HeaderPage, HeaderPageMut, InternalPage, InternalPageMut, LeafPage, LeafPageMut};
