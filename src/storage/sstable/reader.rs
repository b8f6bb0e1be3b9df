//! SSTable Reader
//!
//! Opens and validates SSTable files and provides O(log n) key lookups via
//! an in-memory index.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{AtlasQError, Result};
use crate::wal::read_array;

use super::{FLAG_TOMBSTONE, FOOTER_SIZE, HEADER_SIZE, MAGIC, TOMBSTONE_MARKER, VERSION};

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    offset: u64,
    tombstone: bool,
}

/// Reader for SSTable files with in-memory index for O(log n) lookups
#[derive(Debug)]
pub struct SSTableReader {
    path: PathBuf,
    file: BufReader<File>,
    index: BTreeMap<Vec<u8>, IndexEntry>,
    entry_count: u64,
}

impl SSTableReader {
    /// Open an SSTable for reading
    ///
    /// Verifies header, footer and both checksums, then loads the index into
    /// memory. Any structural problem is reported as `Corrupted`.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::load(path, file).map_err(|e| match e {
            AtlasQError::Io(io) if io.kind() == io::ErrorKind::UnexpectedEof => {
                AtlasQError::Corrupted(format!("SSTable {} is truncated", path.display()))
            }
            other => other,
        })
    }

    fn load(path: &Path, mut file: File) -> Result<Self> {
        let corrupted = |what: &str| {
            AtlasQError::Corrupted(format!("SSTable {}: {}", path.display(), what))
        };

        let file_size = file.metadata()?.len();
        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(corrupted("file too small"));
        }

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;

        if &header[0..4] != MAGIC {
            return Err(corrupted("invalid magic"));
        }
        let version = u16::from_le_bytes(read_array(&header[4..6]));
        if version != VERSION {
            return Err(corrupted(&format!("unsupported version {}", version)));
        }
        let entry_count = u64::from_le_bytes(read_array(&header[6..14]));

        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;

        let index_offset = u64::from_le_bytes(read_array(&footer[0..8]));
        let data_crc = u32::from_le_bytes(read_array(&footer[8..12]));
        let index_crc = u32::from_le_bytes(read_array(&footer[12..16]));

        if index_offset < HEADER_SIZE || index_offset > file_size - FOOTER_SIZE {
            return Err(corrupted("index offset out of range"));
        }

        // Data block checksum
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        let mut data = vec![0u8; (index_offset - HEADER_SIZE) as usize];
        file.read_exact(&mut data)?;
        if crc32fast::hash(&data) != data_crc {
            return Err(corrupted("data block checksum mismatch"));
        }

        // Index block: [key_len(4)][offset(8)][flags(1)][key]
        let mut index_data = vec![0u8; (file_size - FOOTER_SIZE - index_offset) as usize];
        file.read_exact(&mut index_data)?;
        if crc32fast::hash(&index_data) != index_crc {
            return Err(corrupted("index block checksum mismatch"));
        }

        let mut index = BTreeMap::new();
        let mut pos = 0;
        while pos < index_data.len() {
            if pos + 13 > index_data.len() {
                return Err(corrupted("truncated index entry"));
            }
            let key_len = u32::from_le_bytes(read_array(&index_data[pos..pos + 4])) as usize;
            let offset = u64::from_le_bytes(read_array(&index_data[pos + 4..pos + 12]));
            let flags = index_data[pos + 12];
            pos += 13;

            if pos + key_len > index_data.len() || offset >= index_offset {
                return Err(corrupted("malformed index entry"));
            }
            let key = index_data[pos..pos + key_len].to_vec();
            pos += key_len;

            index.insert(
                key,
                IndexEntry {
                    offset,
                    tombstone: flags & FLAG_TOMBSTONE != 0,
                },
            );
        }

        if index.len() as u64 != entry_count {
            return Err(corrupted("entry count does not match index"));
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: BufReader::new(file),
            index,
            entry_count,
        })
    }

    /// Get a value by key (O(log n) lookup via in-memory index)
    ///
    /// Returns:
    /// - `Ok(Some(value))`: key found with value
    /// - `Ok(None)`: key found but is a tombstone (deleted)
    /// - `Err(KeyNotFound)`: key not in this SSTable
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let entry = match self.index.get(key) {
            Some(entry) => *entry,
            None => return Err(AtlasQError::KeyNotFound),
        };

        self.file.seek(SeekFrom::Start(entry.offset))?;

        let mut header = [0u8; 8];
        self.file.read_exact(&mut header)?;

        let key_len = u32::from_le_bytes(read_array(&header[0..4])) as usize;
        let val_len = u32::from_le_bytes(read_array(&header[4..8]));

        // Skip the key (we already know it matches)
        self.file.seek(SeekFrom::Current(key_len as i64))?;

        if val_len == TOMBSTONE_MARKER {
            return Ok(None);
        }

        let mut value = vec![0u8; val_len as usize];
        self.file.read_exact(&mut value)?;

        Ok(Some(value))
    }

    /// All keys in ascending order, each paired with its tombstone flag
    pub fn keys(&self) -> impl Iterator<Item = (&[u8], bool)> + '_ {
        self.index.iter().map(|(k, e)| (k.as_slice(), e.tombstone))
    }

    /// Get entry count
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
