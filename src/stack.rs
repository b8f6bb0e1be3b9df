//! Stack
//!
//! A durable LIFO stack over the same big-endian ID keys as [`Queue`].
//! The bounds run the other way round: `head` is the newest record and
//! `tail` the ID just before the oldest, so live IDs are `(tail, head]`.
//!
//! [`Queue`]: crate::queue::Queue

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::codec::{id_to_key, key_to_id};
use crate::config::Config;
use crate::error::{AtlasQError, Result};
use crate::item::{encode_json, encode_object, Item};
use crate::lifecycle::{self, Collection, CollectionKind};
use crate::store::{OpenMode, SortedStore};

struct StackState {
    store: Option<Box<dyn SortedStore>>,
    /// ID of the newest record
    head: u64,
    /// ID just before the oldest record
    tail: u64,
}

impl StackState {
    fn store(&self) -> Result<&dyn SortedStore> {
        self.store.as_deref().ok_or(AtlasQError::Closed)
    }

    fn len(&self) -> u64 {
        self.head - self.tail
    }

    fn item(&self, id: u64) -> Result<Item> {
        let store = self.store()?;
        if self.len() == 0 {
            return Err(AtlasQError::Empty);
        }
        if id <= self.tail || id > self.head {
            return Err(AtlasQError::OutOfRange);
        }

        let key = id_to_key(id).to_vec();
        let value = store.get(&key)?.ok_or(AtlasQError::KeyNotFound)?;
        Ok(Item { id, key, value })
    }
}

/// A standard LIFO (last in, first out) stack
pub struct Stack {
    data_dir: PathBuf,
    state: RwLock<StackState>,
}

impl Stack {
    /// Open the stack stored at `path`, creating it if needed
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
        let store = lifecycle::open_store(config, CollectionKind::Stack, mode)?;
        Self::with_store(data_dir, store)
    }

    pub(crate) fn with_store(data_dir: PathBuf, store: Box<dyn SortedStore>) -> Result<Self> {
        let (head, tail) = match store.first_last(None)? {
            Some((first, last)) => (key_to_id(&last)?, key_to_id(&first)?.saturating_sub(1)),
            None => (0, 0),
        };
        debug!(head, tail, "stack bounds loaded");

        Ok(Self {
            data_dir,
            state: RwLock::new(StackState {
                store: Some(store),
                head,
                tail,
            }),
        })
    }

    /// Push a value on top of the stack
    pub fn push(&self, value: &[u8]) -> Result<Item> {
        let mut state = self.state.write();
        let id = state.head + 1;
        let key = id_to_key(id).to_vec();

        state.store()?.put(&key, value)?;
        state.head = id;

        Ok(Item {
            id,
            key,
            value: value.to_vec(),
        })
    }

    pub fn push_str(&self, value: &str) -> Result<Item> {
        self.push(value.as_bytes())
    }

    pub fn push_object<T: Serialize + ?Sized>(&self, value: &T) -> Result<Item> {
        self.push(&encode_object(value)?)
    }

    pub fn push_object_as_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<Item> {
        self.push(&encode_json(value)?)
    }

    /// Remove and return the newest record
    ///
    /// A failed delete leaves the stack unchanged and returns the record
    /// inside [`AtlasQError::DequeueIncomplete`].
    pub fn pop(&self) -> Result<Item> {
        let mut state = self.state.write();
        let item = state.item(state.head)?;

        if let Err(e) = state.store()?.delete(&item.key) {
            return Err(AtlasQError::DequeueIncomplete {
                item: Box::new(item.into()),
                source: Box::new(e),
            });
        }
        state.head -= 1;

        Ok(item)
    }

    pub fn peek(&self) -> Result<Item> {
        let state = self.state.read();
        state.item(state.head)
    }

    /// The record `offset` places below the top
    pub fn peek_by_offset(&self, offset: u64) -> Result<Item> {
        let state = self.state.read();
        state.store()?;
        if state.len() == 0 {
            return Err(AtlasQError::Empty);
        }
        if offset >= state.len() {
            return Err(AtlasQError::OutOfRange);
        }
        state.item(state.head - offset)
    }

    pub fn peek_by_id(&self, id: u64) -> Result<Item> {
        self.state.read().item(id)
    }

    pub fn update(&self, id: u64, value: &[u8]) -> Result<Item> {
        let state = self.state.write();
        let store = state.store()?;
        if id <= state.tail || id > state.head {
            return Err(AtlasQError::OutOfRange);
        }

        let key = id_to_key(id).to_vec();
        store.put(&key, value)?;

        Ok(Item {
            id,
            key,
            value: value.to_vec(),
        })
    }

    pub fn update_str(&self, id: u64, value: &str) -> Result<Item> {
        self.update(id, value.as_bytes())
    }

    pub fn update_object<T: Serialize + ?Sized>(&self, id: u64, value: &T) -> Result<Item> {
        self.update(id, &encode_object(value)?)
    }

    pub fn update_object_as_json<T: Serialize + ?Sized>(&self, id: u64, value: &T) -> Result<Item> {
        self.update(id, &encode_json(value)?)
    }

    pub fn len(&self) -> u64 {
        self.state.read().len()
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
        state.head = 0;
        state.tail = 0;
        lifecycle::close_store(&mut state.store)
    }

    pub fn drop(&self) -> Result<()> {
        self.close()?;
        lifecycle::remove_dir(&self.data_dir)
    }
}

impl Collection for Stack {
    fn kind(&self) -> CollectionKind {
        CollectionKind::Stack
    }

    fn data_dir(&self) -> &Path {
        Stack::data_dir(self)
    }

    fn len(&self) -> u64 {
        Stack::len(self)
    }

    fn is_open(&self) -> bool {
        Stack::is_open(self)
    }

    fn close(&self) -> Result<()> {
        Stack::close(self)
    }
}
