//! Store Adapter
//!
//! The boundary between the collections and the sorted key-value store
//! beneath them. Collections only ever talk to a [`SortedStore`]; the
//! crate's own [`Engine`](crate::engine::Engine) is the production
//! implementation.

use crate::error::Result;

/// How a store directory should be opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Refuse to open a damaged store (`Corrupted`)
    Strict,

    /// Repair what can be repaired and open whatever survives
    Recover,
}

/// A durable key-value store with byte-lexicographic key order
///
/// Every method is a complete, durable operation by the time it returns
/// `Ok`. A store must not be shared by two collections.
pub trait SortedStore: Send + Sync {
    /// Value stored under `key`, if any
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Insert or overwrite `key`
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove `key`. Removing an absent key succeeds.
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Snapshot of the live keys starting with `prefix` (all keys for
    /// `None`), in ascending order
    fn iter(&self, prefix: Option<&[u8]>) -> Result<KeyIter>;

    /// Smallest and largest live keys starting with `prefix`, without
    /// materialising the keys in between
    fn first_last(&self, prefix: Option<&[u8]>) -> Result<Option<(Vec<u8>, Vec<u8>)>>;

    /// Flush and release the store. Further calls fail with `Closed`.
    fn close(&self) -> Result<()>;
}

/// Ordered cursor over a key snapshot
///
/// `next()` walks forward from the first key, `next_back()` backward from
/// the last one.
#[derive(Debug, Default)]
pub struct KeyIter {
    keys: std::vec::IntoIter<Vec<u8>>,
}

impl KeyIter {
    pub fn new(keys: Vec<Vec<u8>>) -> Self {
        Self {
            keys: keys.into_iter(),
        }
    }
}

impl Iterator for KeyIter {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        self.keys.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.keys.size_hint()
    }
}

impl DoubleEndedIterator for KeyIter {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.keys.next_back()
    }
}

impl ExactSizeIterator for KeyIter {}
