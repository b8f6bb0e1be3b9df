//! WAL Reader
//!
//! Splits a WAL file into frames. The whole file is loaded into memory and
//! walked frame by frame; the caller decides what a bad frame means.
//!
//! A frame's length is only trusted once its header CRC checks out. A header
//! that fails it is skipped by scanning forward to the next valid frame.

use std::fs;
use std::path::Path;

use crate::error::Result;

use super::{WalEntry, HEADER_SIZE};

/// One step of a WAL walk
#[derive(Debug)]
pub enum Frame {
    /// A well-formed entry occupying `size` bytes
    Entry { entry: WalEntry, size: usize },

    /// `size` bytes that failed validation, followed by more of the log
    Corrupt { size: usize },

    /// The log ends inside a frame (torn write): either fewer bytes remain
    /// than a valid header announces, or a bad header has no valid frame
    /// after it
    Torn,
}

/// Reads frames from a WAL file
pub struct WalReader {
    data: Vec<u8>,
    position: usize,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_bytes(fs::read(path)?))
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data, position: 0 }
    }

    /// Byte offset of the next unread frame
    pub fn position(&self) -> usize {
        self.position
    }

    /// True once every byte has been consumed
    pub fn is_at_end(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Read the next frame. `None` at end of file.
    pub fn next_frame(&mut self) -> Option<Frame> {
        if self.is_at_end() {
            return None;
        }

        let remaining = &self.data[self.position..];
        if remaining.len() < HEADER_SIZE {
            self.position = self.data.len();
            return Some(Frame::Torn);
        }

        let len = match WalEntry::frame_len(remaining) {
            Some(len) => len,
            None => return Some(self.resync()),
        };
        let size = HEADER_SIZE + len;
        if remaining.len() < size {
            self.position = self.data.len();
            return Some(Frame::Torn);
        }

        self.position += size;
        match WalEntry::deserialize(&remaining[..size]) {
            Ok(entry) => Some(Frame::Entry { entry, size }),
            Err(_) => Some(Frame::Corrupt { size }),
        }
    }

    /// Skip past a header that failed its CRC to the next valid frame
    fn resync(&mut self) -> Frame {
        let start = self.position;
        match (start + 1..self.data.len()).find(|&offset| self.valid_frame_at(offset)) {
            Some(offset) => {
                self.position = offset;
                Frame::Corrupt {
                    size: offset - start,
                }
            }
            None => {
                self.position = self.data.len();
                Frame::Torn
            }
        }
    }

    fn valid_frame_at(&self, offset: usize) -> bool {
        let bytes = &self.data[offset..];
        match WalEntry::frame_len(bytes) {
            Some(len) if bytes.len() >= HEADER_SIZE + len => {
                WalEntry::deserialize(&bytes[..HEADER_SIZE + len]).is_ok()
            }
            _ => false,
        }
    }

    /// Iterate over every valid entry, stopping at the first bad frame
    pub fn entries(self) -> WalIterator {
        WalIterator { reader: self }
    }
}

/// Iterator over the leading run of valid WAL entries
pub struct WalIterator {
    reader: WalReader,
}

impl Iterator for WalIterator {
    type Item = WalEntry;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.next_frame()? {
            Frame::Entry { entry, .. } => Some(entry),
            Frame::Corrupt { .. } | Frame::Torn => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::Operation;

    fn frame(lsn: u64) -> Vec<u8> {
        WalEntry::new(lsn, Operation::Delete { key: vec![lsn as u8] })
            .serialize()
            .unwrap()
    }

    #[test]
    fn test_reads_frames_in_order() {
        let mut data = frame(1);
        data.extend(frame(2));
        let lsns: Vec<u64> = WalReader::from_bytes(data).entries().map(|e| e.lsn).collect();

        assert_eq!(lsns, vec![1, 2]);
    }

    #[test]
    fn test_torn_tail_reported() {
        let mut data = frame(1);
        let second = frame(2);
        data.extend_from_slice(&second[..second.len() - 3]);

        let mut reader = WalReader::from_bytes(data);
        assert!(matches!(reader.next_frame(), Some(Frame::Entry { .. })));
        assert!(matches!(reader.next_frame(), Some(Frame::Torn)));
        assert!(reader.next_frame().is_none());
    }

    #[test]
    fn test_damaged_length_resyncs_to_next_frame() {
        let mut data = frame(1);
        data.extend(frame(2));
        data.extend(frame(3));
        data[12..16].copy_from_slice(&0x00FF_FFFFu32.to_le_bytes());

        let mut reader = WalReader::from_bytes(data);
        assert!(matches!(reader.next_frame(), Some(Frame::Corrupt { .. })));
        let lsns: Vec<u64> = reader.entries().map(|e| e.lsn).collect();
        assert_eq!(lsns, vec![2, 3]);
    }

    #[test]
    fn test_damaged_final_header_is_torn() {
        let mut data = frame(1);
        let second = data.len();
        data.extend(frame(2));
        data[second + 12] ^= 0xFF;

        let mut reader = WalReader::from_bytes(data);
        assert!(matches!(reader.next_frame(), Some(Frame::Entry { .. })));
        assert!(matches!(reader.next_frame(), Some(Frame::Torn)));
        assert!(reader.next_frame().is_none());
    }

    #[test]
    fn test_corrupt_frame_is_skippable() {
        let mut data = frame(1);
        let crc_byte = data.len() + 8;
        data.extend(frame(2));
        data[crc_byte] ^= 0xFF;
        data.extend(frame(3));

        let mut reader = WalReader::from_bytes(data);
        assert!(matches!(reader.next_frame(), Some(Frame::Entry { .. })));
        assert!(matches!(reader.next_frame(), Some(Frame::Corrupt { .. })));
        match reader.next_frame() {
            Some(Frame::Entry { entry, .. }) => assert_eq!(entry.lsn, 3),
            other => panic!("expected entry 3, got {:?}", other),
        }
    }
}
