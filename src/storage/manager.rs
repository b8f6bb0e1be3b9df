//! Storage Manager
//!
//! Manages the live SSTable set and coordinates table reads/writes.
//!
//! ## Responsibilities
//! - Load the SSTables named by the MANIFEST on startup
//! - Rebuild the table set from the directory in recovery mode
//! - Create new SSTables from MemTable flushes
//! - Compact every live key into a single table

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{AtlasQError, Result};
use crate::memtable::MemTableEntry;
use crate::store::OpenMode;

use super::{Manifest, SSTableBuilder, SSTableReader};

/// Manages the storage layer
///
/// Not internally synchronised: the engine owns it behind its state mutex.
#[derive(Debug)]
pub struct StorageManager {
    /// Directory holding the MANIFEST
    data_dir: PathBuf,

    /// Directory where SSTables are stored
    sstable_dir: PathBuf,

    /// Open SSTable readers keyed by id (ascending id = oldest first)
    sstables: BTreeMap<u64, SSTableReader>,

    /// Persisted description of `sstables`
    manifest: Manifest,
}

impl StorageManager {
    const SSTABLE_DIR: &'static str = "sstables";

    /// Open the table set of the store rooted at `data_dir`
    ///
    /// In [`OpenMode::Strict`] every table listed in the MANIFEST must open
    /// cleanly. In [`OpenMode::Recover`] the MANIFEST is ignored, every table
    /// file in the directory is tried, damaged ones are set aside with a
    /// `.corrupt` suffix, and a fresh MANIFEST is written.
    pub fn open(data_dir: &Path, mode: OpenMode) -> Result<Self> {
        let sstable_dir = data_dir.join(Self::SSTABLE_DIR);
        fs::create_dir_all(&sstable_dir)?;

        let (manifest, sstables) = match mode {
            OpenMode::Strict => Self::open_strict(data_dir, &sstable_dir)?,
            OpenMode::Recover => Self::open_recover(data_dir, &sstable_dir)?,
        };

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            sstable_dir,
            sstables,
            manifest,
        })
    }

    fn open_strict(
        data_dir: &Path,
        sstable_dir: &Path,
    ) -> Result<(Manifest, BTreeMap<u64, SSTableReader>)> {
        let manifest = match Manifest::load(data_dir)? {
            Some(manifest) => manifest,
            None => {
                if !Self::discover_ids(sstable_dir)?.is_empty() {
                    return Err(AtlasQError::Corrupted(
                        "MANIFEST is missing but SSTables exist".to_string(),
                    ));
                }
                let manifest = Manifest::default();
                manifest.store(data_dir)?;
                manifest
            }
        };

        let mut sstables = BTreeMap::new();
        for &id in &manifest.sstable_ids {
            let path = Self::sstable_path_with_dir(sstable_dir, id);
            if !path.exists() {
                return Err(AtlasQError::Corrupted(format!(
                    "SSTable {} listed in MANIFEST is missing",
                    id
                )));
            }
            sstables.insert(id, SSTableReader::open(&path)?);
        }

        Ok((manifest, sstables))
    }

    fn open_recover(
        data_dir: &Path,
        sstable_dir: &Path,
    ) -> Result<(Manifest, BTreeMap<u64, SSTableReader>)> {
        let previous_next = match Manifest::load(data_dir) {
            Ok(Some(manifest)) => manifest.next_sstable_id,
            Ok(None) => 1,
            Err(e) => {
                warn!(error = %e, "ignoring unreadable MANIFEST during recovery");
                1
            }
        };

        let ids = Self::discover_ids(sstable_dir)?;
        let mut sstables = BTreeMap::new();
        for &id in &ids {
            let path = Self::sstable_path_with_dir(sstable_dir, id);
            match SSTableReader::open(&path) {
                Ok(reader) => {
                    sstables.insert(id, reader);
                }
                Err(e) if e.is_corrupted() => {
                    warn!(sstable = id, error = %e, "setting aside damaged SSTable");
                    fs::rename(&path, path.with_extension("sst.corrupt"))?;
                }
                Err(e) => return Err(e),
            }
        }

        let next_sstable_id = ids
            .last()
            .map(|&id| id + 1)
            .unwrap_or(1)
            .max(previous_next);
        let manifest = Manifest {
            sstable_ids: sstables.keys().copied().collect(),
            next_sstable_id,
        };
        manifest.store(data_dir)?;
        debug!(tables = manifest.sstable_ids.len(), "rebuilt MANIFEST");

        Ok((manifest, sstables))
    }

    /// Whether `data_dir` holds any SSTable files
    pub fn has_tables(data_dir: &Path) -> Result<bool> {
        let sstable_dir = data_dir.join(Self::SSTABLE_DIR);
        if !sstable_dir.exists() {
            return Ok(false);
        }
        Ok(!Self::discover_ids(&sstable_dir)?.is_empty())
    }

    /// Look up `key` in table `id`
    ///
    /// Same contract as [`SSTableReader::get`].
    pub fn get(&mut self, id: u64, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let reader = self.sstables.get_mut(&id).ok_or_else(|| {
            AtlasQError::Storage(format!("SSTable {} is not open", id))
        })?;
        reader.get(key)
    }

    /// Live tables, oldest first
    pub fn tables(&self) -> impl Iterator<Item = (u64, &SSTableReader)> {
        self.sstables.iter().map(|(&id, reader)| (id, reader))
    }

    /// Write sorted memtable entries to a new SSTable and record it in the
    /// MANIFEST. Returns the new table's id.
    pub fn flush<I>(&mut self, entries: I) -> Result<u64>
    where
        I: IntoIterator<Item = (Vec<u8>, MemTableEntry)>,
    {
        let id = self.manifest.next_sstable_id;
        let path = self.sstable_path(id);

        let mut builder = SSTableBuilder::new(&path)?;
        for (key, entry) in entries {
            match entry {
                MemTableEntry::Value(v) => builder.add(&key, &v)?,
                MemTableEntry::Tombstone => builder.add_tombstone(&key)?,
            }
        }
        let metadata = builder.finish()?;
        let reader = SSTableReader::open(&path)?;

        let mut manifest = self.manifest.clone();
        manifest.sstable_ids.push(id);
        manifest.next_sstable_id = id + 1;
        manifest.store(&self.data_dir)?;
        self.manifest = manifest;
        self.sstables.insert(id, reader);

        debug!(
            sstable = id,
            entries = metadata.entry_count,
            bytes = metadata.file_size,
            "flushed memtable"
        );
        Ok(id)
    }

    /// Rewrite every live key into one table and drop the rest
    ///
    /// `live` yields each live key with the id of the table holding its
    /// newest value, in ascending key order. Returns the id of the new table,
    /// or `None` when there were no live keys (all tables are dropped).
    pub fn compact<'a, I>(&mut self, live: I) -> Result<Option<u64>>
    where
        I: IntoIterator<Item = (&'a [u8], u64)>,
    {
        let id = self.manifest.next_sstable_id;
        let path = self.sstable_path(id);

        let mut builder = SSTableBuilder::new(&path)?;
        let mut written = 0u64;
        for (key, table) in live {
            match self.get(table, key)? {
                Some(value) => builder.add(key, &value)?,
                None => {
                    return Err(AtlasQError::Storage(format!(
                        "live key resolved to a tombstone in SSTable {}",
                        table
                    )));
                }
            }
            written += 1;
        }
        builder.finish()?;

        let old_ids: Vec<u64> = self.sstables.keys().copied().collect();
        let (new_id, reader) = if written > 0 {
            (Some(id), Some(SSTableReader::open(&path)?))
        } else {
            fs::remove_file(&path)?;
            (None, None)
        };

        let manifest = Manifest {
            sstable_ids: new_id.into_iter().collect(),
            next_sstable_id: id + 1,
        };
        manifest.store(&self.data_dir)?;
        self.manifest = manifest;
        if let Some(reader) = reader {
            self.sstables.insert(id, reader);
        }

        // The MANIFEST no longer references the old tables.
        for old in &old_ids {
            self.sstables.remove(old);
            if let Err(e) = fs::remove_file(self.sstable_path(*old)) {
                warn!(sstable = old, error = %e, "failed to remove compacted SSTable");
            }
        }

        debug!(merged = old_ids.len(), live = written, "compacted SSTables");
        Ok(new_id)
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.sstables.len()
    }

    /// Get the next SSTable ID (for testing/debugging)
    pub fn next_sstable_id(&self) -> u64 {
        self.manifest.next_sstable_id
    }

    pub fn sstable_dir(&self) -> &Path {
        &self.sstable_dir
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn sstable_path(&self, id: u64) -> PathBuf {
        Self::sstable_path_with_dir(&self.sstable_dir, id)
    }

    fn sstable_path_with_dir(dir: &Path, id: u64) -> PathBuf {
        dir.join(format!("sstable_{:06}.sst", id))
    }

    /// Ids of all `sstable_NNNNNN.sst` files in `dir`, ascending
    fn discover_ids(dir: &Path) -> Result<Vec<u64>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                if let Some(id) = Self::parse_sstable_id(&path) {
                    ids.push(id);
                }
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// "sstable_000042.sst" → Some(42)
    fn parse_sstable_id(path: &Path) -> Option<u64> {
        if path.extension()? != "sst" {
            return None;
        }
        let name = path.file_stem()?.to_string_lossy();
        let id_str = name.strip_prefix("sstable_")?;
        id_str.parse().ok()
    }
}
