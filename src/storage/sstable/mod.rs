//! SSTable Module
//!
//! Sorted String Table - immutable on-disk sorted key-value storage.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (14 bytes)                                       │
//! │   Magic: "ATLQ" (4) | Version: u16 (2) | Count: u64 (8) │
//! ├─────────────────────────────────────────────────────────┤
//! │ Data Block (variable)                                   │
//! │   [KeyLen: u32][ValLen: u32][Key][Value]                │
//! │   ... repeated for each entry ...                       │
//! │   (ValLen = u32::MAX means tombstone, no value bytes)   │
//! ├─────────────────────────────────────────────────────────┤
//! │ Index Block (variable)                                  │
//! │   [KeyLen: u32][Offset: u64][Flags: u8][Key]            │
//! │   ... repeated for each entry ...                       │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (16 bytes)                                       │
//! │   IndexOffset: u64 (8) | DataCRC: u32 (4) | IndexCRC (4)│
//! └─────────────────────────────────────────────────────────┘
//! ```

mod builder;
mod reader;

use std::path::PathBuf;

pub use builder::SSTableBuilder;
pub use reader::SSTableReader;

// =============================================================================
// Shared Constants (used by builder and reader)
// =============================================================================

/// Magic bytes identifying an AtlasQ SSTable file
pub(crate) const MAGIC: &[u8; 4] = b"ATLQ";

/// Current SSTable format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + EntryCount (8) = 14 bytes
pub(crate) const HEADER_SIZE: u64 = 14;

/// Footer size: IndexOffset (8) + DataCRC (4) + IndexCRC (4) = 16 bytes
pub(crate) const FOOTER_SIZE: u64 = 16;

/// Sentinel value indicating a tombstone (deleted key)
pub(crate) const TOMBSTONE_MARKER: u32 = u32::MAX;

/// Index flag bit set on tombstone entries
pub(crate) const FLAG_TOMBSTONE: u8 = 0x01;

// =============================================================================
// SSTable Metadata
// =============================================================================

/// Metadata describing a freshly written SSTable
#[derive(Debug, Clone)]
pub struct SSTable {
    /// Path to the SSTable file
    pub path: PathBuf,
    /// Number of entries (tombstones included)
    pub entry_count: u64,
    /// Smallest key
    pub min_key: Vec<u8>,
    /// Largest key
    pub max_key: Vec<u8>,
    /// File size in bytes
    pub file_size: u64,
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::error::AtlasQError;

    fn build(path: &std::path::Path) -> SSTable {
        let mut builder = SSTableBuilder::new(path).unwrap();
        builder.add(b"a", b"1").unwrap();
        builder.add_tombstone(b"b").unwrap();
        builder.add(b"c", b"333").unwrap();
        builder.finish().unwrap()
    }

    #[test]
    fn test_build_and_read() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("t.sst");
        let meta = build(&path);

        assert_eq!(meta.entry_count, 3);
        assert_eq!(meta.min_key, b"a");
        assert_eq!(meta.max_key, b"c");

        let mut reader = SSTableReader::open(&path).unwrap();
        assert_eq!(reader.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(reader.get(b"b").unwrap(), None);
        assert_eq!(reader.get(b"c").unwrap(), Some(b"333".to_vec()));
        assert!(matches!(reader.get(b"zz"), Err(AtlasQError::KeyNotFound)));

        let keys: Vec<(Vec<u8>, bool)> =
            reader.keys().map(|(k, t)| (k.to_vec(), t)).collect();
        assert_eq!(
            keys,
            vec![
                (b"a".to_vec(), false),
                (b"b".to_vec(), true),
                (b"c".to_vec(), false)
            ]
        );
    }

    #[test]
    fn test_corrupted_data_block_detected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("t.sst");
        build(&path);

        let mut bytes = fs::read(&path).unwrap();
        bytes[HEADER_SIZE as usize + 8] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        assert!(SSTableReader::open(&path).unwrap_err().is_corrupted());
    }

    #[test]
    fn test_bad_magic_and_short_file_detected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("t.sst");
        build(&path);

        let mut bytes = fs::read(&path).unwrap();
        bytes[0] = b'X';
        fs::write(&path, &bytes).unwrap();
        assert!(SSTableReader::open(&path).unwrap_err().is_corrupted());

        fs::write(&path, b"ATLQ").unwrap();
        assert!(SSTableReader::open(&path).unwrap_err().is_corrupted());
    }
}
