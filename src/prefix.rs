//! Prefix Queue
//!
//! Independent FIFO groups named by caller-supplied byte prefixes. A group
//! owns the key range `prefix ++ ':'` and is tracked from the first time it
//! is touched. Groups have no order relative to each other; every operation
//! names the group it works on.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::bounds::Bounds;
use crate::codec::{prefixed_key, split_prefixed_key};
use crate::config::Config;
use crate::error::{AtlasQError, Result};
use crate::item::{encode_json, encode_object, PrefixItem};
use crate::lifecycle::{self, Collection, CollectionKind};
use crate::store::{OpenMode, SortedStore};

struct PrefixState {
    store: Option<Box<dyn SortedStore>>,
    /// Drained groups stay tracked so their IDs keep climbing
    groups: HashMap<Vec<u8>, Bounds>,
}

impl PrefixState {
    fn store(&self) -> Result<&dyn SortedStore> {
        self.store.as_deref().ok_or(AtlasQError::Closed)
    }

    fn group(&self, prefix: &[u8]) -> Bounds {
        self.groups.get(prefix).copied().unwrap_or_default()
    }

    fn item(&self, prefix: &[u8], id: u64) -> Result<PrefixItem> {
        let store = self.store()?;
        let bounds = self.group(prefix);
        if bounds.is_empty() {
            return Err(AtlasQError::Empty);
        }
        if !bounds.contains(id) {
            return Err(AtlasQError::OutOfRange);
        }

        let key = prefixed_key(prefix, id);
        let value = store.get(&key)?.ok_or(AtlasQError::KeyNotFound)?;
        Ok(PrefixItem {
            id,
            prefix: prefix.to_vec(),
            key,
            value,
        })
    }
}

fn check_prefix(prefix: &[u8]) -> Result<()> {
    if prefix.is_empty() {
        return Err(AtlasQError::EmptyPrefix);
    }
    Ok(())
}

/// A set of FIFO queues keyed by prefix, sharing one store
pub struct PrefixQueue {
    data_dir: PathBuf,
    state: RwLock<PrefixState>,
}

impl PrefixQueue {
    /// Open the prefix queue stored at `path`, creating it if needed
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(Config::new(path.as_ref()))
    }

    pub fn open_with_config(config: Config) -> Result<Self> {
        Self::open_in_mode(config, OpenMode::Strict)
    }

    pub fn recover(path: impl AsRef<Path>) -> Result<Self> {
        Self::recover_with_config(Config::new(path.as_ref()))
    }

    pub fn recover_with_config(config: Config) -> Result<Self> {
        Self::open_in_mode(config, OpenMode::Recover)
    }

    fn open_in_mode(config: Config, mode: OpenMode) -> Result<Self> {
        let data_dir = config.data_dir.clone();
        let store = lifecycle::open_store(config, CollectionKind::PrefixQueue, mode)?;
        Self::with_store(data_dir, store)
    }

    /// Rebuild every group's bounds in one pass over the store's keys
    pub(crate) fn with_store(data_dir: PathBuf, store: Box<dyn SortedStore>) -> Result<Self> {
        let mut spans: HashMap<Vec<u8>, (u64, u64)> = HashMap::new();
        for key in store.iter(None)? {
            let (prefix, id) = split_prefixed_key(&key)?;
            spans
                .entry(prefix.to_vec())
                .and_modify(|(min, max)| {
                    *min = (*min).min(id);
                    *max = (*max).max(id);
                })
                .or_insert((id, id));
        }

        let groups: HashMap<Vec<u8>, Bounds> = spans
            .into_iter()
            .map(|(prefix, (min, max))| (prefix, Bounds::spanning(min, max)))
            .collect();
        debug!(groups = groups.len(), "prefix queue groups loaded");

        Ok(Self {
            data_dir,
            state: RwLock::new(PrefixState {
                store: Some(store),
                groups,
            }),
        })
    }

    /// Add a value at the tail of group `prefix`
    pub fn enqueue(&self, prefix: &[u8], value: &[u8]) -> Result<PrefixItem> {
        check_prefix(prefix)?;
        let mut state = self.state.write();
        let id = state.group(prefix).next_id();
        let key = prefixed_key(prefix, id);

        state.store()?.put(&key, value)?;
        state.groups.entry(prefix.to_vec()).or_default().tail = id;

        Ok(PrefixItem {
            id,
            prefix: prefix.to_vec(),
            key,
            value: value.to_vec(),
        })
    }

    pub fn enqueue_str(&self, prefix: &[u8], value: &str) -> Result<PrefixItem> {
        self.enqueue(prefix, value.as_bytes())
    }

    pub fn enqueue_object<T: Serialize + ?Sized>(
        &self,
        prefix: &[u8],
        value: &T,
    ) -> Result<PrefixItem> {
        self.enqueue(prefix, &encode_object(value)?)
    }

    pub fn enqueue_object_as_json<T: Serialize + ?Sized>(
        &self,
        prefix: &[u8],
        value: &T,
    ) -> Result<PrefixItem> {
        self.enqueue(prefix, &encode_json(value)?)
    }

    /// Remove and return the oldest record of group `prefix`
    ///
    /// A failed delete returns the record inside
    /// [`AtlasQError::DequeueIncomplete`] and leaves the group unchanged.
    pub fn dequeue(&self, prefix: &[u8]) -> Result<PrefixItem> {
        check_prefix(prefix)?;
        let mut state = self.state.write();
        let item = state.item(prefix, state.group(prefix).front())?;

        if let Err(e) = state.store()?.delete(&item.key) {
            return Err(AtlasQError::DequeueIncomplete {
                item: Box::new(item.into()),
                source: Box::new(e),
            });
        }
        if let Some(bounds) = state.groups.get_mut(prefix) {
            bounds.head += 1;
        }

        Ok(item)
    }

    pub fn peek(&self, prefix: &[u8]) -> Result<PrefixItem> {
        check_prefix(prefix)?;
        let state = self.state.read();
        state.item(prefix, state.group(prefix).front())
    }

    /// The record `offset` places behind the oldest one in group `prefix`
    pub fn peek_by_offset(&self, prefix: &[u8], offset: u64) -> Result<PrefixItem> {
        check_prefix(prefix)?;
        let state = self.state.read();
        state.store()?;
        let bounds = state.group(prefix);
        if bounds.is_empty() {
            return Err(AtlasQError::Empty);
        }
        let id = bounds.id_at(offset).ok_or(AtlasQError::OutOfRange)?;
        state.item(prefix, id)
    }

    pub fn peek_by_id(&self, prefix: &[u8], id: u64) -> Result<PrefixItem> {
        check_prefix(prefix)?;
        self.state.read().item(prefix, id)
    }

    pub fn update(&self, prefix: &[u8], id: u64, value: &[u8]) -> Result<PrefixItem> {
        check_prefix(prefix)?;
        let state = self.state.write();
        let store = state.store()?;
        if !state.group(prefix).contains(id) {
            return Err(AtlasQError::OutOfRange);
        }

        let key = prefixed_key(prefix, id);
        store.put(&key, value)?;

        Ok(PrefixItem {
            id,
            prefix: prefix.to_vec(),
            key,
            value: value.to_vec(),
        })
    }

    pub fn update_str(&self, prefix: &[u8], id: u64, value: &str) -> Result<PrefixItem> {
        self.update(prefix, id, value.as_bytes())
    }

    pub fn update_object<T: Serialize + ?Sized>(
        &self,
        prefix: &[u8],
        id: u64,
        value: &T,
    ) -> Result<PrefixItem> {
        self.update(prefix, id, &encode_object(value)?)
    }

    pub fn update_object_as_json<T: Serialize + ?Sized>(
        &self,
        prefix: &[u8],
        id: u64,
        value: &T,
    ) -> Result<PrefixItem> {
        self.update(prefix, id, &encode_json(value)?)
    }

    /// Total records across all groups
    pub fn len(&self) -> u64 {
        self.state.read().groups.values().map(Bounds::len).sum()
    }

    pub fn prefix_len(&self, prefix: &[u8]) -> u64 {
        self.state.read().group(prefix).len()
    }

    /// Prefixes of every non-empty group, in byte order
    pub fn prefixes(&self) -> Vec<Vec<u8>> {
        let state = self.state.read();
        let mut prefixes: Vec<Vec<u8>> = state
            .groups
            .iter()
            .filter(|(_, bounds)| !bounds.is_empty())
            .map(|(prefix, _)| prefix.clone())
            .collect();
        prefixes.sort();
        prefixes
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_open(&self) -> bool {
        self.state.read().store.is_some()
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn close(&self) -> Result<()> {
        let mut state = self.state.write();
        state.groups.clear();
        lifecycle::close_store(&mut state.store)
    }

    pub fn drop(&self) -> Result<()> {
        self.close()?;
        lifecycle::remove_dir(&self.data_dir)
    }
}

impl Collection for PrefixQueue {
    fn kind(&self) -> CollectionKind {
        CollectionKind::PrefixQueue
    }

    fn data_dir(&self) -> &Path {
        PrefixQueue::data_dir(self)
    }

    fn len(&self) -> u64 {
        PrefixQueue::len(self)
    }

    fn is_open(&self) -> bool {
        PrefixQueue::is_open(self)
    }

    fn close(&self) -> Result<()> {
        PrefixQueue::close(self)
    }
}
