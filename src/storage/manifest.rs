//! MANIFEST
//!
//! Records which SSTables are live. Written atomically (temp file + rename)
//! after every flush and compaction.
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬──────────────────────┐
//! │ Magic (4)│ CRC (4)  │ Len (4)  │ bincode(Manifest)    │
//! └──────────┴──────────┴──────────┴──────────────────────┘
//! ```

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AtlasQError, Result};
use crate::wal::read_array;

pub const MANIFEST_FILENAME: &str = "MANIFEST";

const MANIFEST_MAGIC: &[u8; 4] = b"AQMF";
const MANIFEST_HEADER: usize = 12;

/// The live SSTable set of one store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Live SSTable ids, oldest first
    pub sstable_ids: Vec<u64>,

    /// Id for the next SSTable to be written
    pub next_sstable_id: u64,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            sstable_ids: Vec::new(),
            next_sstable_id: 1,
        }
    }
}

impl Manifest {
    /// Load the MANIFEST from `dir`. `Ok(None)` if there is none.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let bytes = match fs::read(dir.join(MANIFEST_FILENAME)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Self::decode(&bytes).map(Some)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MANIFEST_HEADER || &bytes[0..4] != MANIFEST_MAGIC {
            return Err(AtlasQError::Corrupted("MANIFEST header is invalid".to_string()));
        }
        let crc = u32::from_le_bytes(read_array(&bytes[4..8]));
        let len = u32::from_le_bytes(read_array(&bytes[8..12])) as usize;
        let body = bytes
            .get(MANIFEST_HEADER..MANIFEST_HEADER + len)
            .ok_or_else(|| AtlasQError::Corrupted("MANIFEST is truncated".to_string()))?;

        if crc32fast::hash(body) != crc {
            return Err(AtlasQError::Corrupted("MANIFEST checksum mismatch".to_string()));
        }

        let manifest: Manifest = bincode::deserialize(body)
            .map_err(|e| AtlasQError::Corrupted(format!("MANIFEST body: {}", e)))?;

        if manifest.sstable_ids.iter().any(|&id| id >= manifest.next_sstable_id) {
            return Err(AtlasQError::Corrupted(
                "MANIFEST lists an SSTable id beyond next_sstable_id".to_string(),
            ));
        }

        Ok(manifest)
    }

    /// Atomically replace the MANIFEST in `dir`
    pub fn store(&self, dir: &Path) -> Result<()> {
        let body = bincode::serialize(self)?;
        let mut bytes = Vec::with_capacity(MANIFEST_HEADER + body.len());
        bytes.extend_from_slice(MANIFEST_MAGIC);
        bytes.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
        bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&body);

        let tmp = dir.join(format!("{}.tmp", MANIFEST_FILENAME));
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, dir.join(MANIFEST_FILENAME))?;
        Ok(())
    }
}
