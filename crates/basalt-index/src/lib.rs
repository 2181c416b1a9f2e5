//! Disk-resident B+ tree index for Basalt.
//!
//! This crate provides:
//! - Fixed-width index keys with an injected total order
//! - Typed views over B+ tree page buffers (header, leaf, internal)
//! - A unique-key B+ tree with latch-crabbed search, insert, and delete
//! - A forward iterator over the leaf chain

pub mod btree;
pub mod key;

pub use btree::{BPlusTree, IndexIterator};
pub use key::{GenericComparator, GenericKey, IndexKey, KeyComparator};
