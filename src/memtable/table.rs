//! MemTable implementation
//!
//! BTreeMap-based memtable with RwLock for concurrency.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use super::MemTableEntry;

/// Fixed per-entry bookkeeping charged against the size limit
const ENTRY_OVERHEAD: usize = 16;

/// In-memory table for recent writes
pub struct MemTable {
    data: RwLock<BTreeMap<Vec<u8>, MemTableEntry>>,
    /// Approximate size in bytes
    size: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            size: AtomicUsize::new(0),
        }
    }

    /// Get an entry by key. `Some(Tombstone)` means the key was deleted here.
    pub fn get(&self, key: &[u8]) -> Option<MemTableEntry> {
        self.data.read().get(key).cloned()
    }

    /// Put a key-value pair, returning the new approximate size
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> usize {
        self.insert(key, MemTableEntry::Value(value))
    }

    /// Delete a key (inserts tombstone), returning the new approximate size
    pub fn delete(&self, key: Vec<u8>) -> usize {
        self.insert(key, MemTableEntry::Tombstone)
    }

    fn insert(&self, key: Vec<u8>, entry: MemTableEntry) -> usize {
        let added = Self::entry_size(&key, &entry);
        let mut data = self.data.write();
        let removed = data
            .get(&key)
            .map(|old| Self::entry_size(&key, old))
            .unwrap_or(0);
        data.insert(key, entry);

        // Both updates happen under the write lock.
        let size = self.size.load(Ordering::SeqCst) + added - removed;
        self.size.store(size, Ordering::SeqCst);
        size
    }

    fn entry_size(key: &[u8], entry: &MemTableEntry) -> usize {
        let value_len = match entry {
            MemTableEntry::Value(v) => v.len(),
            MemTableEntry::Tombstone => 0,
        };
        key.len() + value_len + ENTRY_OVERHEAD
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    /// Get entry count (tombstones included)
    pub fn entry_count(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Snapshot of all entries in sorted key order (for flush)
    pub fn iter(&self) -> std::vec::IntoIter<(Vec<u8>, MemTableEntry)> {
        self.data
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// Clear all entries (after successful flush)
    pub fn clear(&self) {
        let mut data = self.data.write();
        data.clear();
        self.size.store(0, Ordering::SeqCst);
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_delete() {
        let table = MemTable::new();
        table.put(b"a".to_vec(), b"1".to_vec());

        assert_eq!(table.get(b"a"), Some(MemTableEntry::Value(b"1".to_vec())));

        table.delete(b"a".to_vec());
        assert_eq!(table.get(b"a"), Some(MemTableEntry::Tombstone));
        assert_eq!(table.get(b"missing"), None);
    }

    #[test]
    fn test_size_tracks_overwrites() {
        let table = MemTable::new();
        let first = table.put(b"k".to_vec(), vec![0; 10]);
        let second = table.put(b"k".to_vec(), vec![0; 4]);

        assert_eq!(first - second, 6);
        assert_eq!(table.entry_count(), 1);

        table.clear();
        assert_eq!(table.size(), 0);
        assert!(table.is_empty());
    }

    #[test]
    fn test_iter_is_sorted() {
        let table = MemTable::new();
        for key in [b"c", b"a", b"b"] {
            table.put(key.to_vec(), Vec::new());
        }
        let keys: Vec<Vec<u8>> = table.iter().map(|(k, _)| k).collect();

        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }
}
