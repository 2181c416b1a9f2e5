//! Page identifiers and layout constants.

use serde::{Deserialize, Serialize};

/// Size of every page in bytes (4 KiB).
pub const PAGE_SIZE: usize = 4096;

/// Unique identifier for a page within the data file.
///
/// Stored on disk as a `u32`; the all-ones pattern (the two's-complement
/// encoding of -1) is the `INVALID` sentinel denoting absence.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PageId(pub u32);

impl PageId {
    /// Sentinel denoting "no page".
    pub const INVALID: PageId = PageId(u32::MAX);

    /// Returns true if this is not the `INVALID` sentinel.
    #[inline]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// Byte offset of this page within the data file.
    #[inline]
    pub fn file_offset(&self) -> u64 {
        self.0 as u64 * PAGE_SIZE as u64
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "page:{}", self.0)
        } else {
            write!(f, "page:invalid")
        }
    }
}

/// Page kind tag stored in the common page header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PageKind {
    /// Unallocated or never-initialized page.
    Invalid = 0,
    /// B+ tree leaf page.
    Leaf = 1,
    /// B+ tree internal page.
    Internal = 2,
}

impl PageKind {
    /// Decodes a stored tag. Unknown tags decode as `Invalid`.
    pub fn from_tag(tag: u32) -> Self {
        match tag {
            1 => PageKind::Leaf,
            2 => PageKind::Internal,
            _ => PageKind::Invalid,
        }
    }

    /// The on-disk tag value.
    #[inline]
    pub fn tag(self) -> u32 {
        self as u32
    }
}
