//! Configuration structures for Basalt.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage configuration for the index subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the data file.
    pub data_path: PathBuf,
    /// Enable fsync after writes.
    pub fsync_enabled: bool,
    /// Buffer pool size in number of frames.
    pub buffer_pool_frames: usize,
    /// K parameter of the LRU-K replacement policy.
    pub lru_k: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("./basalt.db"),
            fsync_enabled: true,
            buffer_pool_frames: 1024,
            lru_k: 2,
        }
    }
}

/// Configuration of a single B+ tree index.
///
/// `None` sizes mean "derive from the physical slot capacity of the page".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Maximum entries per leaf page.
    pub leaf_max_size: Option<u32>,
    /// Maximum children per internal page.
    pub internal_max_size: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_default() {
        let config = StorageConfig::default();
        assert_eq!(config.data_path, PathBuf::from("./basalt.db"));
        assert!(config.fsync_enabled);
        assert_eq!(config.buffer_pool_frames, 1024);
        assert_eq!(config.lru_k, 2);
    }

    #[test]
    fn test_index_config_default() {
        let config = IndexConfig::default();
        assert!(config.leaf_max_size.is_none());
        assert!(config.internal_max_size.is_none());
    }

    #[test]
    fn test_storage_config_serde_roundtrip() {
        let config = StorageConfig {
            data_path: PathBuf::from("/tmp/test.db"),
            fsync_enabled: false,
            buffer_pool_frames: 64,
            lru_k: 3,
        };
        let serialized = serde_json::to_string(&config).unwrap();
        let deserialized: StorageConfig = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized.data_path, config.data_path);
        assert_eq!(deserialized.fsync_enabled, config.fsync_enabled);
        assert_eq!(deserialized.buffer_pool_frames, config.buffer_pool_frames);
        assert_eq!(deserialized.lru_k, config.lru_k);
    }

    #[test]
    fn test_index_config_serde_roundtrip() {
        let config = IndexConfig {
            leaf_max_size: Some(4),
            internal_max_size: Some(4),
        };
        let serialized = serde_json::to_string(&config).unwrap();
        let deserialized: IndexConfig = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized.leaf_max_size, Some(4));
        assert_eq!(deserialized.internal_max_size, Some(4));
    }
}
