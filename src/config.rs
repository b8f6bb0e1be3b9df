//! Configuration for AtlasQ
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{AtlasQError, Result};

/// Configuration for one collection's storage directory
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for the collection's files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── COLLECTION       (collection-type marker)
    ///     ├── MANIFEST         (live SSTable set)
    ///     ├── wal.log          (write-ahead log)
    ///     └── sstables/        (SSTable files)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    // -------------------------------------------------------------------------
    // MemTable / SSTable Configuration
    // -------------------------------------------------------------------------
    /// Max size of memtable before flush (in bytes)
    pub memtable_size_limit: usize,

    /// Number of SSTables tolerated before they are compacted into one
    pub max_sstables: usize,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./atlasq_data"),
            wal_sync_strategy: WalSyncStrategy::EveryWrite,
            memtable_size_limit: 4 * 1024 * 1024, // 4 MB
            max_sstables: 4,
        }
    }
}

impl Config {
    /// Default config rooted at `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check that the settings describe a usable store
    pub fn validate(&self) -> Result<()> {
        if self.memtable_size_limit == 0 {
            return Err(AtlasQError::Config(
                "memtable_size_limit must be greater than zero".to_string(),
            ));
        }
        if self.max_sstables == 0 {
            return Err(AtlasQError::Config(
                "max_sstables must be at least 1".to_string(),
            ));
        }
        if let WalSyncStrategy::EveryNEntries { count: 0 } = self.wal_sync_strategy {
            return Err(AtlasQError::Config(
                "EveryNEntries sync count must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the memtable size limit (in bytes)
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.config.memtable_size_limit = size;
        self
    }

    /// Set how many SSTables may accumulate before compaction
    pub fn max_sstables(mut self, count: usize) -> Self {
        self.config.max_sstables = count;
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let config = Config::builder()
            .data_dir("/tmp/q")
            .memtable_size_limit(128)
            .max_sstables(2)
            .wal_sync_strategy(WalSyncStrategy::EveryNEntries { count: 10 })
            .build()
            .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/q"));
        assert_eq!(config.memtable_size_limit, 128);
        assert_eq!(config.max_sstables, 2);
        assert_eq!(
            config.wal_sync_strategy,
            WalSyncStrategy::EveryNEntries { count: 10 }
        );
    }

    #[test]
    fn test_builder_rejects_zero_limits() {
        assert!(matches!(
            Config::builder().memtable_size_limit(0).build(),
            Err(AtlasQError::Config(_))
        ));
        assert!(matches!(
            Config::builder().max_sstables(0).build(),
            Err(AtlasQError::Config(_))
        ));
        assert!(matches!(
            Config::builder()
                .wal_sync_strategy(WalSyncStrategy::EveryNEntries { count: 0 })
                .build(),
            Err(AtlasQError::Config(_))
        ));
    }
}
