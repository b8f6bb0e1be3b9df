//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and their framing.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{AtlasQError, Result};

/// Frame header: LSN (8) + CRC (4) + Len (4) + Header CRC (4)
pub const HEADER_SIZE: usize = 20;

/// Bytes of the header covered by the header CRC
const HEADER_BODY: usize = 16;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing within one log
    pub lsn: u64,

    /// The operation to perform
    pub operation: Operation,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },
}

impl WalEntry {
    pub fn new(lsn: u64, operation: Operation) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            lsn,
            operation,
            timestamp,
        }
    }

    /// Encode into a framed record ready to append to the log
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let data = bincode::serialize(self)?;
        let crc = crc32fast::hash(&data);

        let len = u32::try_from(data.len())
            .map_err(|_| AtlasQError::Storage("WAL record too large".to_string()))?;

        let mut buf = Vec::with_capacity(HEADER_SIZE + data.len());
        buf.extend_from_slice(&self.lsn.to_le_bytes());
        buf.extend_from_slice(&crc.to_le_bytes());
        buf.extend_from_slice(&len.to_le_bytes());
        let header_crc = crc32fast::hash(&buf[..HEADER_BODY]);
        buf.extend_from_slice(&header_crc.to_le_bytes());
        buf.extend_from_slice(&data);
        Ok(buf)
    }

    /// Payload length announced by the frame header at the start of `bytes`.
    /// `None` if the header is incomplete or fails its own CRC.
    pub fn frame_len(bytes: &[u8]) -> Option<usize> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }
        let stored = u32::from_le_bytes(read_array(&bytes[HEADER_BODY..HEADER_SIZE]));
        if crc32fast::hash(&bytes[..HEADER_BODY]) != stored {
            return None;
        }
        Some(u32::from_le_bytes(read_array(&bytes[12..16])) as usize)
    }

    /// Decode one framed record. The slice must hold exactly one frame
    /// (trailing bytes are ignored).
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(AtlasQError::Corrupted("WAL record too short".to_string()));
        }

        let lsn = u64::from_le_bytes(read_array(&bytes[0..8]));
        let stored_crc = u32::from_le_bytes(read_array(&bytes[8..12]));
        let len = Self::frame_len(bytes)
            .ok_or_else(|| AtlasQError::Corrupted("WAL header failed CRC check".to_string()))?;

        if bytes.len() < HEADER_SIZE + len {
            return Err(AtlasQError::Corrupted("WAL record truncated".to_string()));
        }

        let data = &bytes[HEADER_SIZE..HEADER_SIZE + len];
        if crc32fast::hash(data) != stored_crc {
            return Err(AtlasQError::Corrupted(format!(
                "WAL record {} failed CRC check",
                lsn
            )));
        }

        let entry: WalEntry = bincode::deserialize(data)
            .map_err(|e| AtlasQError::Corrupted(format!("WAL record {}: {}", lsn, e)))?;

        if entry.lsn != lsn {
            return Err(AtlasQError::Corrupted(format!(
                "WAL header LSN {} does not match body LSN {}",
                lsn, entry.lsn
            )));
        }

        Ok(entry)
    }

    /// Key touched by this entry's operation
    pub fn key(&self) -> &[u8] {
        match &self.operation {
            Operation::Put { key, .. } | Operation::Delete { key } => key,
        }
    }
}

pub(crate) fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}
