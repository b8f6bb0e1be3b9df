//! Engine Module
//!
//! The durable sorted key-value store every collection is built on.
//!
//! ## Responsibilities
//! - Coordinate WAL, MemTable, and Storage
//! - Keep a unified key index so lookups and ordered scans need no merge
//! - Trigger flushes when the MemTable is full and compactions when too many
//!   SSTables accumulate
//! - Detect corruption on open and repair it in recovery mode

use std::collections::btree_map::Range;
use std::collections::BTreeMap;
use std::fs;
use std::ops::Bound;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AtlasQError, Result};
use crate::memtable::{MemTable, MemTableEntry};
use crate::storage::{StorageManager, MANIFEST_FILENAME};
use crate::store::{KeyIter, OpenMode, SortedStore};
use crate::wal::{Operation, WalRecovery, WalWriter};

/// Where the newest value of a live key lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    MemTable,
    Table(u64),
}

/// Everything the engine mutates, guarded by one mutex
struct EngineState {
    wal: WalWriter,
    memtable: MemTable,
    storage: StorageManager,
    /// Every live key; deleted keys are absent
    index: BTreeMap<Vec<u8>, Location>,
    closed: bool,
}

/// The main storage engine
///
/// ## Concurrency Model
///
/// All state sits behind a single `parking_lot::Mutex`. Collections already
/// serialise their own mutations, so the engine lock is only ever briefly
/// contended between concurrent peeks.
pub struct Engine {
    config: Config,
    state: Mutex<EngineState>,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "wal.log";

    /// Open or create an engine, refusing damaged stores
    ///
    /// On startup:
    /// 1. Open/create data directory
    /// 2. Load the MANIFEST and its SSTables
    /// 3. Replay the WAL and flush it into an SSTable
    /// 4. Ready to serve requests
    pub fn open(config: Config) -> Result<Self> {
        Self::open_with_mode(config, OpenMode::Strict)
    }

    /// Open an engine, repairing a damaged MANIFEST, SSTables, or WAL
    pub fn recover(config: Config) -> Result<Self> {
        Self::open_with_mode(config, OpenMode::Recover)
    }

    /// Open with a path (convenience method)
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::new(path))
    }

    pub fn open_with_mode(config: Config, mode: OpenMode) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let data_dir = config.data_dir.clone();
        let wal_path = data_dir.join(Self::WAL_FILENAME);

        if mode == OpenMode::Strict
            && !data_dir.join(MANIFEST_FILENAME).exists()
            && (wal_path.exists() || StorageManager::has_tables(&data_dir)?)
        {
            return Err(AtlasQError::Corrupted(format!(
                "{} has store files but no MANIFEST",
                data_dir.display()
            )));
        }

        let storage = StorageManager::open(&data_dir, mode)?;
        let index = Self::build_index(&storage);

        let memtable = MemTable::new();
        let mut last_lsn = 0;
        if wal_path.exists() {
            let (entries, result) = WalRecovery::recover(&wal_path, mode)?;
            if result.entries_recovered > 0 || result.entries_corrupted > 0 || result.was_truncated {
                info!(
                    recovered = result.entries_recovered,
                    corrupted = result.entries_corrupted,
                    truncated = result.was_truncated,
                    last_lsn = result.last_lsn,
                    "WAL replay"
                );
            }
            last_lsn = result.last_lsn;
            for entry in entries {
                match entry.operation {
                    Operation::Put { key, value } => {
                        memtable.put(key, value);
                    }
                    Operation::Delete { key } => {
                        memtable.delete(key);
                    }
                }
            }
        }

        let wal = WalWriter::open_at(&wal_path, config.wal_sync_strategy, last_lsn)?;

        let mut state = EngineState {
            wal,
            memtable,
            storage,
            index,
            closed: false,
        };
        for (key, entry) in state.memtable.iter() {
            match entry {
                MemTableEntry::Value(_) => {
                    state.index.insert(key, Location::MemTable);
                }
                MemTableEntry::Tombstone => {
                    state.index.remove(&key);
                }
            }
        }

        // Make replayed data durable in an SSTable, then start a clean log so
        // new frames never follow a torn or skipped one.
        Self::flush_locked(&mut state, config.max_sstables)?;
        state.wal.truncate()?;

        debug!(
            dir = %data_dir.display(),
            keys = state.index.len(),
            sstables = state.storage.sstable_count(),
            ?mode,
            "engine opened"
        );

        Ok(Self {
            config,
            state: Mutex::new(state),
        })
    }

    /// Live keys from the SSTables, newer tables shadowing older ones
    fn build_index(storage: &StorageManager) -> BTreeMap<Vec<u8>, Location> {
        let mut index = BTreeMap::new();
        for (id, table) in storage.tables() {
            for (key, tombstone) in table.keys() {
                if tombstone {
                    index.remove(key);
                } else {
                    index.insert(key.to_vec(), Location::Table(id));
                }
            }
        }
        index
    }

    /// Flush memtable to disk (public API)
    pub fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;
        Self::flush_locked(&mut state, self.config.max_sstables)
    }

    /// Flush with the state lock held
    fn flush_locked(state: &mut EngineState, max_sstables: usize) -> Result<()> {
        if state.memtable.is_empty() {
            return Ok(());
        }

        let id = state.storage.flush(state.memtable.iter())?;
        for (key, entry) in state.memtable.iter() {
            if let MemTableEntry::Value(_) = entry {
                state.index.insert(key, Location::Table(id));
            }
        }
        state.memtable.clear();

        // Entries are now durable in the SSTable.
        state.wal.truncate()?;

        if state.storage.sstable_count() > max_sstables {
            Self::compact_locked(state)?;
        }
        Ok(())
    }

    /// Flush after a write once the MemTable reaches its limit
    ///
    /// The write is already in the WAL, MemTable and index, so it stands even
    /// if the flush fails. The flush is retried by the next write and by
    /// `close`.
    fn flush_if_full(state: &mut EngineState, memtable_size: usize, config: &Config) {
        if memtable_size < config.memtable_size_limit {
            return;
        }
        if let Err(e) = Self::flush_locked(state, config.max_sstables) {
            warn!(
                error = %e,
                memtable_bytes = state.memtable.size(),
                "memtable flush failed, will retry"
            );
        }
    }

    /// Index entries whose key starts with `prefix`
    fn prefix_range<'a>(
        index: &'a BTreeMap<Vec<u8>, Location>,
        prefix: Option<&[u8]>,
    ) -> Range<'a, Vec<u8>, Location> {
        let prefix = match prefix {
            Some(prefix) => prefix,
            None => return index.range::<Vec<u8>, _>(..),
        };

        // Smallest key greater than every key carrying the prefix
        let mut upper = prefix.to_vec();
        while upper.last() == Some(&u8::MAX) {
            upper.pop();
        }
        let end = match upper.pop() {
            Some(byte) => {
                upper.push(byte + 1);
                Bound::Excluded(upper)
            }
            None => Bound::Unbounded,
        };
        index.range((Bound::Included(prefix.to_vec()), end))
    }

    fn compact_locked(state: &mut EngineState) -> Result<()> {
        let EngineState { storage, index, .. } = state;

        // Compaction only runs straight after a flush.
        let live = index
            .iter()
            .map(|(key, location)| match location {
                Location::Table(id) => Ok((key.as_slice(), *id)),
                Location::MemTable => Err(AtlasQError::Storage(
                    "memtable key present during compaction".to_string(),
                )),
            })
            .collect::<Result<Vec<_>>>()?;
        let new_id = storage.compact(live)?;

        if let Some(id) = new_id {
            for location in index.values_mut() {
                *location = Location::Table(id);
            }
        }
        Ok(())
    }

    fn check_open(state: &EngineState) -> Result<()> {
        if state.closed {
            Err(AtlasQError::Closed)
        } else {
            Ok(())
        }
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the SSTable directory path
    pub fn storage_dir(&self) -> PathBuf {
        self.state.lock().storage.sstable_dir().to_path_buf()
    }

    /// Get the current memtable size
    pub fn memtable_size(&self) -> usize {
        self.state.lock().memtable.size()
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.state.lock().storage.sstable_count()
    }

    /// Number of live keys
    pub fn key_count(&self) -> usize {
        self.state.lock().index.len()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl SortedStore for Engine {
    /// Get a value by key through the unified index
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;

        match state.index.get(key).copied() {
            None => Ok(None),
            Some(Location::MemTable) => match state.memtable.get(key) {
                Some(MemTableEntry::Value(value)) => Ok(Some(value)),
                _ => Err(AtlasQError::Storage(
                    "index points at a memtable entry that is not live".to_string(),
                )),
            },
            Some(Location::Table(id)) => state.storage.get(id, key),
        }
    }

    /// Put a key-value pair
    ///
    /// Steps:
    /// 1. Write to WAL (durability)
    /// 2. Write to MemTable and index
    /// 3. Flush if the MemTable is full (a failed flush does not fail the put)
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;

        state.wal.append(Operation::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        })?;
        let new_size = state.memtable.put(key.to_vec(), value.to_vec());
        state.index.insert(key.to_vec(), Location::MemTable);

        Self::flush_if_full(&mut state, new_size, &self.config);
        Ok(())
    }

    /// Delete a key; deleting an absent key writes nothing
    fn delete(&self, key: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;

        if !state.index.contains_key(key) {
            return Ok(());
        }

        state.wal.append(Operation::Delete { key: key.to_vec() })?;
        let new_size = state.memtable.delete(key.to_vec());
        state.index.remove(key);

        Self::flush_if_full(&mut state, new_size, &self.config);
        Ok(())
    }

    fn iter(&self, prefix: Option<&[u8]>) -> Result<KeyIter> {
        let state = self.state.lock();
        Self::check_open(&state)?;

        let keys = Self::prefix_range(&state.index, prefix)
            .map(|(key, _)| key.clone())
            .collect();
        Ok(KeyIter::new(keys))
    }

    fn first_last(&self, prefix: Option<&[u8]>) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let state = self.state.lock();
        Self::check_open(&state)?;

        let mut range = Self::prefix_range(&state.index, prefix);
        let first = match range.next() {
            Some((key, _)) => key,
            None => return Ok(None),
        };
        let last = range.next_back().map_or(first, |(key, _)| key);
        Ok(Some((first.clone(), last.clone())))
    }

    /// Close the engine gracefully
    ///
    /// Flushes any pending data and syncs to disk. Closing twice is a no-op.
    fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }

        Self::flush_locked(&mut state, self.config.max_sstables)?;
        state.wal.sync()?;
        state.closed = true;

        debug!(dir = %self.config.data_dir.display(), "engine closed");
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if !state.closed {
            if let Err(e) = state.wal.sync() {
                warn!(error = %e, "failed to sync WAL while dropping engine");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::config::WalSyncStrategy;

    fn small_config(dir: &Path) -> Config {
        Config::builder()
            .data_dir(dir)
            .wal_sync_strategy(WalSyncStrategy::EveryWrite)
            .memtable_size_limit(256)
            .max_sstables(2)
            .build()
            .unwrap()
    }

    #[test]
    fn test_put_get_delete() {
        let temp = TempDir::new().unwrap();
        let engine = Engine::open_path(temp.path()).unwrap();

        engine.put(b"hello", b"world").unwrap();
        assert_eq!(engine.get(b"hello").unwrap(), Some(b"world".to_vec()));

        engine.delete(b"hello").unwrap();
        assert_eq!(engine.get(b"hello").unwrap(), None);
        engine.delete(b"never-existed").unwrap();
    }

    #[test]
    fn test_iter_respects_prefix_and_order() {
        let temp = TempDir::new().unwrap();
        let engine = Engine::open_path(temp.path()).unwrap();
        for key in [&b"b:2"[..], b"a:1", b"b:1", b"c:1"] {
            engine.put(key, b"v").unwrap();
        }

        let keys: Vec<Vec<u8>> = engine.iter(Some(b"b:")).unwrap().collect();
        assert_eq!(keys, vec![b"b:1".to_vec(), b"b:2".to_vec()]);
        assert_eq!(engine.iter(None).unwrap().len(), 4);
    }

    #[test]
    fn test_flushes_and_compaction_preserve_contents() {
        let temp = TempDir::new().unwrap();
        let engine = Engine::open(small_config(temp.path())).unwrap();

        for i in 0..200u32 {
            engine.put(&i.to_be_bytes(), format!("value{}", i).as_bytes()).unwrap();
        }
        for i in 0..100u32 {
            engine.delete(&i.to_be_bytes()).unwrap();
        }

        assert!(engine.sstable_count() <= 2);
        assert_eq!(engine.key_count(), 100);
        assert_eq!(engine.get(&50u32.to_be_bytes()).unwrap(), None);
        assert_eq!(
            engine.get(&150u32.to_be_bytes()).unwrap(),
            Some(b"value150".to_vec())
        );
    }

    #[test]
    fn test_reopen_after_close_and_after_drop() {
        let temp = TempDir::new().unwrap();
        {
            let engine = Engine::open_path(temp.path()).unwrap();
            engine.put(b"closed", b"1").unwrap();
            engine.close().unwrap();
            assert!(matches!(engine.get(b"closed"), Err(AtlasQError::Closed)));
        }
        {
            // Dropped without close: the WAL carries the write.
            let engine = Engine::open_path(temp.path()).unwrap();
            engine.put(b"dropped", b"2").unwrap();
        }

        let engine = Engine::open_path(temp.path()).unwrap();
        assert_eq!(engine.get(b"closed").unwrap(), Some(b"1".to_vec()));
        assert_eq!(engine.get(b"dropped").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_missing_manifest_detected_and_recovered() {
        let temp = TempDir::new().unwrap();
        {
            let engine = Engine::open_path(temp.path()).unwrap();
            engine.put(b"k", b"v").unwrap();
            engine.close().unwrap();
        }
        fs::remove_file(temp.path().join(MANIFEST_FILENAME)).unwrap();

        let err = Engine::open_path(temp.path()).err().unwrap();
        assert!(err.is_corrupted());

        let engine = Engine::recover(Config::new(temp.path())).unwrap();
        assert_eq!(engine.get(b"k").unwrap(), Some(b"v".to_vec()));
        engine.close().unwrap();

        // Recovery wrote a fresh MANIFEST.
        assert!(Engine::open_path(temp.path()).is_ok());
    }
}
