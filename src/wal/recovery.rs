//! WAL Recovery
//!
//! Handles crash recovery by replaying the WAL.

use std::path::Path;

use tracing::warn;

use crate::error::{AtlasQError, Result};
use crate::store::OpenMode;

use super::{Frame, WalEntry, WalReader};

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of corrupted entries skipped
    pub entries_corrupted: u64,

    /// Last valid LSN
    pub last_lsn: u64,

    /// Whether a torn final write was discarded
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Recover entries from a WAL file
    ///
    /// A torn final record is a partial write from a crash and is dropped in
    /// either mode. A complete record that fails its CRC is fatal in
    /// [`OpenMode::Strict`] (unless it is the last record in the file) and
    /// skipped in [`OpenMode::Recover`].
    pub fn recover(path: &Path, mode: OpenMode) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let mut reader = WalReader::open(path)?;
        let mut entries = Vec::new();
        let mut result = RecoveryResult::default();

        while let Some(frame) = reader.next_frame() {
            match frame {
                Frame::Entry { entry, .. } => {
                    result.entries_recovered += 1;
                    result.last_lsn = entry.lsn;
                    entries.push(entry);
                }
                Frame::Torn => {
                    result.was_truncated = true;
                }
                Frame::Corrupt { .. } if reader.is_at_end() => {
                    // Last record: indistinguishable from a torn write.
                    result.was_truncated = true;
                }
                Frame::Corrupt { .. } => match mode {
                    OpenMode::Strict => {
                        return Err(AtlasQError::Corrupted(format!(
                            "WAL record ending at offset {} failed validation",
                            reader.position()
                        )));
                    }
                    OpenMode::Recover => {
                        warn!(
                            offset = reader.position(),
                            "skipping corrupted WAL record"
                        );
                        result.entries_corrupted += 1;
                    }
                },
            }
        }

        Ok((entries, result))
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        let (_, result) = Self::recover(path, OpenMode::Recover)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::fs::{self, File};
    use std::io::Write;

    use tempfile::TempDir;

    use super::*;
    use crate::wal::Operation;

    fn write_frames(path: &Path, count: u64) -> Vec<Vec<u8>> {
        let frames: Vec<Vec<u8>> = (1..=count)
            .map(|lsn| {
                WalEntry::new(
                    lsn,
                    Operation::Put {
                        key: format!("key{}", lsn).into_bytes(),
                        value: format!("value{}", lsn).into_bytes(),
                    },
                )
                .serialize()
                .unwrap()
            })
            .collect();
        let mut file = File::create(path).unwrap();
        for f in &frames {
            file.write_all(f).unwrap();
        }
        frames
    }

    #[test]
    fn test_recover_empty_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("wal.log");
        File::create(&path).unwrap();

        let (entries, result) = WalRecovery::recover(&path, OpenMode::Strict).unwrap();
        assert!(entries.is_empty());
        assert_eq!(result, RecoveryResult::default());
    }

    #[test]
    fn test_recover_clean_log() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("wal.log");
        write_frames(&path, 5);

        let (entries, result) = WalRecovery::recover(&path, OpenMode::Strict).unwrap();
        assert_eq!(entries.len(), 5);
        assert_eq!(result.last_lsn, 5);
        assert!(!result.was_truncated);
    }

    #[test]
    fn test_torn_tail_is_tolerated_in_strict_mode() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("wal.log");
        write_frames(&path, 3);
        let len = fs::metadata(&path).unwrap().len();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(len - 4)
            .unwrap();

        let (entries, result) = WalRecovery::recover(&path, OpenMode::Strict).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(result.was_truncated);
    }

    #[test]
    fn test_mid_log_corruption_strict_vs_recover() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("wal.log");
        let frames = write_frames(&path, 3);

        // Flip a CRC byte of the middle frame.
        let mut bytes = fs::read(&path).unwrap();
        bytes[frames[0].len() + 8] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        let err = WalRecovery::recover(&path, OpenMode::Strict).unwrap_err();
        assert!(err.is_corrupted());

        let (entries, result) = WalRecovery::recover(&path, OpenMode::Recover).unwrap();
        assert_eq!(entries.iter().map(|e| e.lsn).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(result.entries_corrupted, 1);
        assert_eq!(WalRecovery::verify(&path).unwrap().entries_recovered, 2);
    }
}
