//! SSTable Builder
//!
//! Streams strictly ascending entries into a new SSTable file. The entry
//! count in the header is patched in once the footer is written.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{AtlasQError, Result};

use super::{SSTable, FLAG_TOMBSTONE, HEADER_SIZE, MAGIC, TOMBSTONE_MARKER, VERSION};

/// Offset of the entry count inside the header
const COUNT_OFFSET: u64 = 6;

struct IndexEntry {
    key: Vec<u8>,
    offset: u64,
    flags: u8,
}

/// Builder for creating new SSTables from sorted entries
pub struct SSTableBuilder {
    path: PathBuf,
    writer: BufWriter<File>,
    /// File offset the next data record starts at
    offset: u64,
    index: Vec<IndexEntry>,
    data_crc: crc32fast::Hasher,
}

/// `[key_len(4)][val_len(4)][key][value]`; tombstones carry no value bytes
fn encode_record(key: &[u8], value: Option<&[u8]>) -> Result<Vec<u8>> {
    let key_len = u32::try_from(key.len())
        .map_err(|_| AtlasQError::Storage("key too large for SSTable".to_string()))?;
    let val_len = match value {
        Some(v) => match u32::try_from(v.len()) {
            Ok(len) if len != TOMBSTONE_MARKER => len,
            _ => return Err(AtlasQError::Storage("value too large for SSTable".to_string())),
        },
        None => TOMBSTONE_MARKER,
    };

    let mut record = Vec::with_capacity(8 + key.len() + value.map_or(0, <[u8]>::len));
    record.extend_from_slice(&key_len.to_le_bytes());
    record.extend_from_slice(&val_len.to_le_bytes());
    record.extend_from_slice(key);
    if let Some(v) = value {
        record.extend_from_slice(v);
    }
    Ok(record)
}

impl SSTableBuilder {
    /// Create the file and write its header
    pub fn new(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);

        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&0u64.to_le_bytes())?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            offset: HEADER_SIZE,
            index: Vec::new(),
            data_crc: crc32fast::Hasher::new(),
        })
    }

    /// Append a live value
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.append(key, Some(value))
    }

    /// Append a tombstone shadowing `key` in older tables
    pub fn add_tombstone(&mut self, key: &[u8]) -> Result<()> {
        self.append(key, None)
    }

    fn append(&mut self, key: &[u8], value: Option<&[u8]>) -> Result<()> {
        if let Some(last) = self.index.last() {
            if key <= last.key.as_slice() {
                return Err(AtlasQError::Storage(
                    "SSTable keys must be added in strictly ascending order".to_string(),
                ));
            }
        }

        let record = encode_record(key, value)?;
        self.writer.write_all(&record)?;
        self.data_crc.update(&record);

        self.index.push(IndexEntry {
            key: key.to_vec(),
            offset: self.offset,
            flags: if value.is_none() { FLAG_TOMBSTONE } else { 0 },
        });
        self.offset += record.len() as u64;
        Ok(())
    }

    /// Write the index block and footer, sync, and describe the table
    pub fn finish(mut self) -> Result<SSTable> {
        let index_offset = self.offset;
        let mut index_crc = crc32fast::Hasher::new();

        for entry in &self.index {
            // [key_len(4)][offset(8)][flags(1)][key]
            let mut record = Vec::with_capacity(13 + entry.key.len());
            record.extend_from_slice(&(entry.key.len() as u32).to_le_bytes());
            record.extend_from_slice(&entry.offset.to_le_bytes());
            record.push(entry.flags);
            record.extend_from_slice(&entry.key);

            index_crc.update(&record);
            self.writer.write_all(&record)?;
        }

        self.writer.write_all(&index_offset.to_le_bytes())?;
        self.writer.write_all(&self.data_crc.finalize().to_le_bytes())?;
        self.writer.write_all(&index_crc.finalize().to_le_bytes())?;

        let entry_count = self.index.len() as u64;
        let mut file = self
            .writer
            .into_inner()
            .map_err(|e| AtlasQError::Storage(format!("Failed to flush SSTable: {}", e)))?;
        file.seek(SeekFrom::Start(COUNT_OFFSET))?;
        file.write_all(&entry_count.to_le_bytes())?;
        file.sync_all()?;

        let mut keys = self.index.into_iter().map(|entry| entry.key);
        let min_key = keys.next().unwrap_or_default();
        let max_key = keys.last().unwrap_or_else(|| min_key.clone());

        Ok(SSTable {
            path: self.path,
            entry_count,
            min_key,
            max_key,
            file_size: file.metadata()?.len(),
        })
    }
}
