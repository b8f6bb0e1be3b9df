//! Priority Queue
//!
//! 256 independent FIFO levels, one per priority byte. Each level owns the
//! key range `[priority, ':']`, so a level is rebuilt on open from the first
//! and last key in its range.
//!
//! Unscoped dequeues are served from a cached *current level*. The cache
//! always names a non-empty level unless the whole queue is empty: an
//! enqueue at a more important level takes it over, and a dequeue that
//! drains it re-selects the most important non-empty level.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::bounds::Bounds;
use crate::codec::{level_key, level_prefix, split_level_key};
use crate::config::Config;
use crate::error::{AtlasQError, Result};
use crate::item::{encode_json, encode_object, PriorityItem};
use crate::lifecycle::{self, Collection, CollectionKind};
use crate::store::{OpenMode, SortedStore};

const LEVELS: usize = 256;

/// Which end of the priority range is served first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    /// Priority 0 first
    #[default]
    Ascending,
    /// Priority 255 first
    Descending,
}

impl Order {
    /// Whether level `a` is served before level `b`
    pub fn more_important(self, a: u8, b: u8) -> bool {
        match self {
            Order::Ascending => a < b,
            Order::Descending => a > b,
        }
    }

    /// The level served last
    fn least_important(self) -> u8 {
        match self {
            Order::Ascending => u8::MAX,
            Order::Descending => 0,
        }
    }

    /// Every level, most important first
    fn levels(self) -> Box<dyn Iterator<Item = u8>> {
        match self {
            Order::Ascending => Box::new(0..=u8::MAX),
            Order::Descending => Box::new((0..=u8::MAX).rev()),
        }
    }
}

struct PriorityState {
    store: Option<Box<dyn SortedStore>>,
    levels: [Bounds; LEVELS],
    current: u8,
}

impl PriorityState {
    fn store(&self) -> Result<&dyn SortedStore> {
        self.store.as_deref().ok_or(AtlasQError::Closed)
    }

    fn level(&self, priority: u8) -> &Bounds {
        &self.levels[priority as usize]
    }

    fn level_mut(&mut self, priority: u8) -> &mut Bounds {
        &mut self.levels[priority as usize]
    }

    fn len(&self) -> u64 {
        self.levels.iter().map(Bounds::len).sum()
    }

    /// Most important non-empty level
    fn select(&self, order: Order) -> Option<u8> {
        order.levels().find(|&p| !self.level(p).is_empty())
    }

    /// Level the next unscoped dequeue serves
    fn target(&self, order: Order) -> Option<u8> {
        if !self.level(self.current).is_empty() {
            return Some(self.current);
        }
        self.select(order)
    }

    /// Point `current` at the most important non-empty level, or the
    /// least important level when the queue is empty
    fn reselect(&mut self, order: Order) {
        self.current = self.select(order).unwrap_or(order.least_important());
    }

    fn item(&self, priority: u8, id: u64) -> Result<PriorityItem> {
        let store = self.store()?;
        let bounds = self.level(priority);
        if bounds.is_empty() {
            return Err(AtlasQError::Empty);
        }
        if !bounds.contains(id) {
            return Err(AtlasQError::OutOfRange);
        }

        let key = level_key(priority, id);
        let value = store.get(&key)?.ok_or(AtlasQError::KeyNotFound)?;
        Ok(PriorityItem {
            id,
            priority,
            key,
            value,
        })
    }

    /// Pop the oldest record of `priority`
    fn pop_front(&mut self, priority: u8) -> Result<PriorityItem> {
        let item = self.item(priority, self.level(priority).front())?;

        if let Err(e) = self.store()?.delete(&item.key) {
            return Err(AtlasQError::DequeueIncomplete {
                item: Box::new(item.into()),
                source: Box::new(e),
            });
        }
        self.level_mut(priority).head += 1;

        Ok(item)
    }
}

/// A queue of 256 FIFO levels served in priority order
pub struct PriorityQueue {
    data_dir: PathBuf,
    order: Order,
    state: RwLock<PriorityState>,
}

impl PriorityQueue {
    /// Open the priority queue stored at `path`, creating it if needed
    ///
    /// `order` is not persisted; reopening with the other order serves the
    /// same records from the other end.
    pub fn open(path: impl AsRef<Path>, order: Order) -> Result<Self> {
        Self::open_with_config(Config::new(path.as_ref()), order)
    }

    pub fn open_with_config(config: Config, order: Order) -> Result<Self> {
        Self::open_in_mode(config, order, OpenMode::Strict)
    }

    pub fn recover(path: impl AsRef<Path>, order: Order) -> Result<Self> {
        Self::recover_with_config(Config::new(path.as_ref()), order)
    }

    pub fn recover_with_config(config: Config, order: Order) -> Result<Self> {
        Self::open_in_mode(config, order, OpenMode::Recover)
    }

    fn open_in_mode(config: Config, order: Order, mode: OpenMode) -> Result<Self> {
        let data_dir = config.data_dir.clone();
        let store = lifecycle::open_store(config, CollectionKind::PriorityQueue, mode)?;
        Self::with_store(data_dir, store, order)
    }

    pub(crate) fn with_store(
        data_dir: PathBuf,
        store: Box<dyn SortedStore>,
        order: Order,
    ) -> Result<Self> {
        let mut levels = [Bounds::default(); LEVELS];
        for priority in 0..=u8::MAX {
            if let Some((first, last)) = store.first_last(Some(&level_prefix(priority)))? {
                let (_, first) = split_level_key(&first)?;
                let (_, last) = split_level_key(&last)?;
                levels[priority as usize] = Bounds::spanning(first, last);
            }
        }

        let mut state = PriorityState {
            store: Some(store),
            levels,
            current: order.least_important(),
        };
        state.reselect(order);
        debug!(
            len = state.len(),
            current = state.current,
            ?order,
            "priority queue levels loaded"
        );

        Ok(Self {
            data_dir,
            order,
            state: RwLock::new(state),
        })
    }

    /// Add a value at the tail of level `priority`
    pub fn enqueue(&self, priority: u8, value: &[u8]) -> Result<PriorityItem> {
        let mut state = self.state.write();
        let id = state.level(priority).next_id();
        let key = level_key(priority, id);

        state.store()?.put(&key, value)?;
        state.level_mut(priority).tail = id;

        let current = state.current;
        if priority != current
            && (state.level(current).is_empty() || self.order.more_important(priority, current))
        {
            state.current = priority;
        }

        Ok(PriorityItem {
            id,
            priority,
            key,
            value: value.to_vec(),
        })
    }

    pub fn enqueue_str(&self, priority: u8, value: &str) -> Result<PriorityItem> {
        self.enqueue(priority, value.as_bytes())
    }

    pub fn enqueue_object<T: Serialize + ?Sized>(
        &self,
        priority: u8,
        value: &T,
    ) -> Result<PriorityItem> {
        self.enqueue(priority, &encode_object(value)?)
    }

    pub fn enqueue_object_as_json<T: Serialize + ?Sized>(
        &self,
        priority: u8,
        value: &T,
    ) -> Result<PriorityItem> {
        self.enqueue(priority, &encode_json(value)?)
    }

    /// Remove and return the oldest record of the most important level
    ///
    /// A failed delete returns the record inside
    /// [`AtlasQError::DequeueIncomplete`] and leaves the queue unchanged.
    pub fn dequeue(&self) -> Result<PriorityItem> {
        let mut state = self.state.write();
        state.store()?;
        let priority = state.target(self.order).ok_or(AtlasQError::Empty)?;
        state.current = priority;

        let item = state.pop_front(priority)?;
        if state.level(priority).is_empty() {
            state.reselect(self.order);
        }
        Ok(item)
    }

    /// Remove and return the oldest record of level `priority`
    pub fn dequeue_by_priority(&self, priority: u8) -> Result<PriorityItem> {
        let mut state = self.state.write();
        let item = state.pop_front(priority)?;
        if priority == state.current && state.level(priority).is_empty() {
            state.reselect(self.order);
        }
        Ok(item)
    }

    /// The record the next [`dequeue`](Self::dequeue) would return
    pub fn peek(&self) -> Result<PriorityItem> {
        let state = self.state.read();
        state.store()?;
        let priority = state.target(self.order).ok_or(AtlasQError::Empty)?;
        state.item(priority, state.level(priority).front())
    }

    /// The record `offset` places from the front, counting across levels in
    /// the order they are served
    pub fn peek_by_offset(&self, offset: u64) -> Result<PriorityItem> {
        let state = self.state.read();
        state.store()?;
        let len = state.len();
        if len == 0 {
            return Err(AtlasQError::Empty);
        }
        if offset >= len {
            return Err(AtlasQError::OutOfRange);
        }

        let mut remaining = offset;
        for priority in self.order.levels() {
            let bounds = state.level(priority);
            match bounds.id_at(remaining) {
                Some(id) => return state.item(priority, id),
                None => remaining -= bounds.len(),
            }
        }
        Err(AtlasQError::OutOfRange)
    }

    pub fn peek_by_priority_id(&self, priority: u8, id: u64) -> Result<PriorityItem> {
        self.state.read().item(priority, id)
    }

    pub fn update(&self, priority: u8, id: u64, value: &[u8]) -> Result<PriorityItem> {
        let state = self.state.write();
        let store = state.store()?;
        if !state.level(priority).contains(id) {
            return Err(AtlasQError::OutOfRange);
        }

        let key = level_key(priority, id);
        store.put(&key, value)?;

        Ok(PriorityItem {
            id,
            priority,
            key,
            value: value.to_vec(),
        })
    }

    pub fn update_str(&self, priority: u8, id: u64, value: &str) -> Result<PriorityItem> {
        self.update(priority, id, value.as_bytes())
    }

    pub fn update_object<T: Serialize + ?Sized>(
        &self,
        priority: u8,
        id: u64,
        value: &T,
    ) -> Result<PriorityItem> {
        self.update(priority, id, &encode_object(value)?)
    }

    pub fn update_object_as_json<T: Serialize + ?Sized>(
        &self,
        priority: u8,
        id: u64,
        value: &T,
    ) -> Result<PriorityItem> {
        self.update(priority, id, &encode_json(value)?)
    }

    /// Total records across all levels
    pub fn len(&self) -> u64 {
        self.state.read().len()
    }

    pub fn level_len(&self, priority: u8) -> u64 {
        self.state.read().level(priority).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn order(&self) -> Order {
        self.order
    }

    pub fn is_open(&self) -> bool {
        self.state.read().store.is_some()
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn close(&self) -> Result<()> {
        let mut state = self.state.write();
        state.levels = [Bounds::default(); LEVELS];
        state.current = self.order.least_important();
        lifecycle::close_store(&mut state.store)
    }

    pub fn drop(&self) -> Result<()> {
        self.close()?;
        lifecycle::remove_dir(&self.data_dir)
    }
}

impl Collection for PriorityQueue {
    fn kind(&self) -> CollectionKind {
        CollectionKind::PriorityQueue
    }

    fn data_dir(&self) -> &Path {
        PriorityQueue::data_dir(self)
    }

    fn len(&self) -> u64 {
        PriorityQueue::len(self)
    }

    fn is_open(&self) -> bool {
        PriorityQueue::is_open(self)
    }

    fn close(&self) -> Result<()> {
        PriorityQueue::close(self)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::engine::Engine;
    use crate::item::Record;
    use crate::store::testing::{Faults, FaultyStore};

    fn faulty_queue(dir: &Path, order: Order) -> (PriorityQueue, std::sync::Arc<Faults>) {
        let engine = Engine::open_path(dir).unwrap();
        let (store, faults) = FaultyStore::new(engine);
        let pq = PriorityQueue::with_store(dir.to_path_buf(), Box::new(store), order).unwrap();
        (pq, faults)
    }

    #[test]
    fn test_order_comparator() {
        assert!(Order::Ascending.more_important(0, 1));
        assert!(!Order::Ascending.more_important(1, 1));
        assert!(Order::Descending.more_important(200, 3));
        assert_eq!(Order::Ascending.levels().next(), Some(0));
        assert_eq!(Order::Descending.levels().next(), Some(255));
        assert_eq!(Order::Descending.levels().count(), 256);
    }

    #[test]
    fn test_current_level_follows_drains() {
        let temp = TempDir::new().unwrap();
        let pq = PriorityQueue::open(temp.path(), Order::Ascending).unwrap();

        pq.enqueue_str(9, "low").unwrap();
        pq.enqueue_str(3, "high").unwrap();
        assert_eq!(pq.state.read().current, 3);

        pq.dequeue().unwrap();
        assert_eq!(pq.state.read().current, 9);

        pq.dequeue().unwrap();
        assert_eq!(pq.state.read().current, u8::MAX);
        assert!(matches!(pq.dequeue(), Err(AtlasQError::Empty)));
    }

    #[test]
    fn test_draining_current_by_priority_reselects() {
        let temp = TempDir::new().unwrap();
        let pq = PriorityQueue::open(temp.path(), Order::Descending).unwrap();

        pq.enqueue_str(5, "a").unwrap();
        pq.enqueue_str(7, "b").unwrap();
        pq.dequeue_by_priority(7).unwrap();

        // Level 4 is less important than the remaining level 5.
        pq.enqueue_str(4, "c").unwrap();
        assert_eq!(pq.dequeue().unwrap().priority, 5);
        assert_eq!(pq.dequeue().unwrap().priority, 4);
    }

    #[test]
    fn test_failed_put_keeps_levels_and_current() {
        let temp = TempDir::new().unwrap();
        let (pq, faults) = faulty_queue(temp.path(), Order::Ascending);
        pq.enqueue_str(5, "queued").unwrap();

        // Level 1 would take over as current had the write landed
        faults.set_put(true);
        assert!(matches!(pq.enqueue_str(1, "lost"), Err(AtlasQError::Storage(_))));
        assert_eq!(pq.level_len(1), 0);
        assert_eq!(pq.len(), 1);
        assert_eq!(pq.state.read().current, 5);
        assert_eq!(pq.peek().unwrap().priority, 5);

        faults.set_put(false);
        assert_eq!(pq.enqueue_str(1, "urgent").unwrap().id, 1);
        assert_eq!(pq.peek().unwrap().priority, 1);
    }

    #[test]
    fn test_failed_delete_keeps_level() {
        let temp = TempDir::new().unwrap();
        let (pq, faults) = faulty_queue(temp.path(), Order::Ascending);

        pq.enqueue_str(2, "only").unwrap();
        faults.set_delete(true);
        match pq.dequeue() {
            Err(AtlasQError::DequeueIncomplete { item, .. }) => match *item {
                Record::Priority(item) => {
                    assert_eq!((item.priority, item.id), (2, 1));
                    assert_eq!(item.value, b"only");
                }
                other => panic!("expected a priority record, got {:?}", other),
            },
            other => panic!("expected DequeueIncomplete, got {:?}", other),
        }
        assert_eq!(pq.level_len(2), 1);

        faults.set_delete(false);
        assert_eq!(pq.dequeue().unwrap().priority, 2);
        assert!(pq.is_empty());
    }
}
