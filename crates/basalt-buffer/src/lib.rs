//! Buffer pool management for Basalt.
//!
//! This crate provides in-memory page caching with:
//! - Fixed-size buffer pool with configurable frame count
//! - LRU-K eviction policy for cache management
//! - Pin counting for concurrent access
//! - Scoped page guards that hold both the pin and the page latch
//! - Read-through / write-back against a page-granular disk manager

mod disk;
mod frame;
mod guard;
mod page_table;
mod pool;
mod replacer;

pub use disk::{DiskManager, DiskManagerConfig};
pub use frame::{Frame, FrameId};
pub use guard::{ReadPageGuard, WritePageGuard};
pub use page_table::PageTable;
pub use pool::{BufferPoolConfig, BufferPoolManager};
pub use replacer::{LruKReplacer, Replacer};
