//! Queue
//!
//! A durable FIFO queue. Records are keyed by their big-endian sequence ID,
//! so the store's key order is the queue order.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::bounds::Bounds;
use crate::codec::{id_to_key, key_to_id};
use crate::config::Config;
use crate::error::{AtlasQError, Result};
use crate::item::{encode_json, encode_object, Item};
use crate::lifecycle::{self, Collection, CollectionKind};
use crate::store::{OpenMode, SortedStore};

struct QueueState {
    /// `None` once closed
    store: Option<Box<dyn SortedStore>>,
    bounds: Bounds,
}

impl QueueState {
    fn store(&self) -> Result<&dyn SortedStore> {
        self.store.as_deref().ok_or(AtlasQError::Closed)
    }

    fn item(&self, id: u64) -> Result<Item> {
        let store = self.store()?;
        if self.bounds.is_empty() {
            return Err(AtlasQError::Empty);
        }
        if !self.bounds.contains(id) {
            return Err(AtlasQError::OutOfRange);
        }

        let key = id_to_key(id).to_vec();
        let value = store.get(&key)?.ok_or(AtlasQError::KeyNotFound)?;
        Ok(Item { id, key, value })
    }
}

/// A standard FIFO (first in, first out) queue
///
/// Mutations take the write lock for their full duration; peeks share the
/// read lock.
pub struct Queue {
    data_dir: PathBuf,
    state: RwLock<QueueState>,
}

impl Queue {
    /// Open the queue stored at `path`, creating it if needed
    ///
    /// A damaged store fails with `Corrupted`; use [`Queue::recover`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(Config::new(path.as_ref()))
    }

    pub fn open_with_config(config: Config) -> Result<Self> {
        Self::open_in_mode(config, OpenMode::Strict)
    }

    /// Open a queue whose store may be damaged, repairing what it can
    pub fn recover(path: impl AsRef<Path>) -> Result<Self> {
        Self::recover_with_config(Config::new(path.as_ref()))
    }

    pub fn recover_with_config(config: Config) -> Result<Self> {
        Self::open_in_mode(config, OpenMode::Recover)
    }

    fn open_in_mode(config: Config, mode: OpenMode) -> Result<Self> {
        let data_dir = config.data_dir.clone();
        let store = lifecycle::open_store(config, CollectionKind::Queue, mode)?;
        Self::with_store(data_dir, store)
    }

    /// Build a queue over an opened store, deriving bounds from its keys
    pub(crate) fn with_store(data_dir: PathBuf, store: Box<dyn SortedStore>) -> Result<Self> {
        let bounds = match store.first_last(None)? {
            Some((first, last)) => Bounds::spanning(key_to_id(&first)?, key_to_id(&last)?),
            None => Bounds::default(),
        };
        debug!(head = bounds.head, tail = bounds.tail, "queue bounds loaded");

        Ok(Self {
            data_dir,
            state: RwLock::new(QueueState {
                store: Some(store),
                bounds,
            }),
        })
    }

    /// Add a value at the tail of the queue
    pub fn enqueue(&self, value: &[u8]) -> Result<Item> {
        let mut state = self.state.write();
        let id = state.bounds.next_id();
        let key = id_to_key(id).to_vec();

        state.store()?.put(&key, value)?;
        state.bounds.tail = id;

        Ok(Item {
            id,
            key,
            value: value.to_vec(),
        })
    }

    pub fn enqueue_str(&self, value: &str) -> Result<Item> {
        self.enqueue(value.as_bytes())
    }

    /// Enqueue `value` in the compact binary encoding
    pub fn enqueue_object<T: Serialize + ?Sized>(&self, value: &T) -> Result<Item> {
        self.enqueue(&encode_object(value)?)
    }

    /// Enqueue `value` encoded as JSON
    pub fn enqueue_object_as_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<Item> {
        self.enqueue(&encode_json(value)?)
    }

    /// Remove and return the oldest record
    ///
    /// If the record is read but cannot be deleted, the queue is left
    /// unchanged and the record comes back inside
    /// [`AtlasQError::DequeueIncomplete`].
    pub fn dequeue(&self) -> Result<Item> {
        let mut state = self.state.write();
        let item = state.item(state.bounds.front())?;

        if let Err(e) = state.store()?.delete(&item.key) {
            return Err(AtlasQError::DequeueIncomplete {
                item: Box::new(item.into()),
                source: Box::new(e),
            });
        }
        state.bounds.head += 1;

        Ok(item)
    }

    /// The oldest record, left in place
    pub fn peek(&self) -> Result<Item> {
        let state = self.state.read();
        state.item(state.bounds.front())
    }

    /// The record `offset` places behind the oldest one
    pub fn peek_by_offset(&self, offset: u64) -> Result<Item> {
        let state = self.state.read();
        state.store()?;
        if state.bounds.is_empty() {
            return Err(AtlasQError::Empty);
        }
        let id = state.bounds.id_at(offset).ok_or(AtlasQError::OutOfRange)?;
        state.item(id)
    }

    pub fn peek_by_id(&self, id: u64) -> Result<Item> {
        self.state.read().item(id)
    }

    /// Overwrite a live record's value without moving it
    pub fn update(&self, id: u64, value: &[u8]) -> Result<Item> {
        let state = self.state.write();
        let store = state.store()?;
        if !state.bounds.contains(id) {
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

    /// Number of live records; 0 once closed
    pub fn len(&self) -> u64 {
        self.state.read().bounds.len()
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

    /// Close the store and reset the bounds. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.write();
        state.bounds = Bounds::default();
        lifecycle::close_store(&mut state.store)
    }

    /// Close the queue and delete its storage directory
    pub fn drop(&self) -> Result<()> {
        self.close()?;
        lifecycle::remove_dir(&self.data_dir)
    }
}

impl Collection for Queue {
    fn kind(&self) -> CollectionKind {
        CollectionKind::Queue
    }

    fn data_dir(&self) -> &Path {
        Queue::data_dir(self)
    }

    fn len(&self) -> u64 {
        Queue::len(self)
    }

    fn is_open(&self) -> bool {
        Queue::is_open(self)
    }

    fn close(&self) -> Result<()> {
        Queue::close(self)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::engine::Engine;
    use crate::item::Payload;
    use crate::store::testing::FaultyStore;

    fn faulty_queue(dir: &Path) -> (Queue, std::sync::Arc<crate::store::testing::Faults>) {
        let engine = Engine::open_path(dir).unwrap();
        let (store, faults) = FaultyStore::new(engine);
        let queue = Queue::with_store(dir.to_path_buf(), Box::new(store)).unwrap();
        (queue, faults)
    }

    #[test]
    fn test_failed_put_leaves_bounds_unchanged() {
        let temp = TempDir::new().unwrap();
        let (queue, faults) = faulty_queue(temp.path());
        queue.enqueue_str("first").unwrap();

        faults.set_put(true);
        assert!(matches!(
            queue.enqueue_str("lost"),
            Err(AtlasQError::Storage(_))
        ));
        assert_eq!(queue.len(), 1);

        faults.set_put(false);
        assert_eq!(queue.enqueue_str("second").unwrap().id, 2);
    }

    #[test]
    fn test_failed_delete_returns_item_and_keeps_it_live() {
        let temp = TempDir::new().unwrap();
        let (queue, faults) = faulty_queue(temp.path());
        queue.enqueue_str("value for item 1").unwrap();
        queue.enqueue_str("value for item 2").unwrap();

        faults.set_delete(true);
        match queue.dequeue() {
            Err(AtlasQError::DequeueIncomplete { item, source }) => {
                assert_eq!(item.id(), 1);
                assert_eq!(item.as_str().unwrap(), "value for item 1");
                assert!(matches!(*source, AtlasQError::Storage(_)));
            }
            other => panic!("expected DequeueIncomplete, got {:?}", other),
        }
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.peek().unwrap().id, 1);

        // Retrying once the store recovers delivers the same record.
        faults.set_delete(false);
        assert_eq!(queue.dequeue().unwrap().id, 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_bounds_rebuilt_from_store_keys() {
        let temp = TempDir::new().unwrap();
        {
            let queue = Queue::open(temp.path()).unwrap();
            for i in 1..=5 {
                queue.enqueue_str(&format!("v{}", i)).unwrap();
            }
            queue.dequeue().unwrap();
            queue.dequeue().unwrap();
            queue.close().unwrap();
        }

        let queue = Queue::open(temp.path()).unwrap();
        let state = queue.state.read();
        assert_eq!(state.bounds, Bounds { head: 2, tail: 5 });
    }
}
