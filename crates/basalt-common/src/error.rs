//! Error types for Basalt.

use thiserror::Error;

/// Result type alias using BasaltError.
pub type Result<T> = std::result::Result<T, BasaltError>;

/// Errors that can occur in Basalt operations.
#[derive(Debug, Error)]
pub enum BasaltError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("page not found: {page_id}")]
    PageNotFound { page_id: u32 },

    #[error("page corrupted: {page_id}, reason: {reason}")]
    PageCorrupted { page_id: u32, reason: String },

    #[error("buffer pool exhausted, unable to claim a frame")]
    PoolExhausted,

    #[error("invalid page kind: expected {expected}, got tag {actual}")]
    InvalidPageKind {
        expected: &'static str,
        actual: u32,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}
