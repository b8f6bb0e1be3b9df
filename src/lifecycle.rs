//! Lifecycle Manager
//!
//! The open / verify-type / close / drop protocol shared by every
//! collection. Each collection owns one storage directory, stamped on first
//! open with a marker naming its collection type:
//!
//! ```text
//! {data_dir}/COLLECTION   "AQCT" (4) | kind (1)
//! ```

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use tracing::{info, warn};

use crate::config::Config;
use crate::engine::Engine;
use crate::error::{AtlasQError, Result};
use crate::store::{OpenMode, SortedStore};

const MARKER_FILENAME: &str = "COLLECTION";
const MARKER_MAGIC: &[u8; 4] = b"AQCT";

/// Which collection type owns a storage directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    Queue = 1,
    Stack = 2,
    PriorityQueue = 3,
    PrefixQueue = 4,
}

impl CollectionKind {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Queue),
            2 => Some(Self::Stack),
            3 => Some(Self::PriorityQueue),
            4 => Some(Self::PrefixQueue),
            _ => None,
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Queue => "queue",
            Self::Stack => "stack",
            Self::PriorityQueue => "priority queue",
            Self::PrefixQueue => "prefix queue",
        };
        f.write_str(name)
    }
}

/// Uniform handle over the four collection types
pub trait Collection {
    fn kind(&self) -> CollectionKind;

    /// Storage directory backing this collection
    fn data_dir(&self) -> &Path;

    /// Number of live records; 0 once closed
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_open(&self) -> bool;

    /// Release the store and forget all bounds. Idempotent.
    fn close(&self) -> Result<()>;

    /// Close, then delete the storage directory
    fn drop(&self) -> Result<()> {
        self.close()?;
        remove_dir(self.data_dir())
    }
}

/// Open the store for a collection of type `kind`
///
/// Opens (or repairs, for [`OpenMode::Recover`]) the engine, then stamps or
/// verifies the type marker. On any failure the engine handle is dropped
/// before returning.
pub fn open_store(
    config: Config,
    kind: CollectionKind,
    mode: OpenMode,
) -> Result<Box<dyn SortedStore>> {
    let data_dir = config.data_dir.clone();
    let engine = Engine::open_with_mode(config, mode)?;
    check_marker(&data_dir, kind, mode)?;

    info!(dir = %data_dir.display(), %kind, ?mode, "opened collection store");
    Ok(Box::new(engine))
}

/// Stamp a new directory with `kind`, or verify an existing stamp
pub fn check_marker(dir: &Path, kind: CollectionKind, mode: OpenMode) -> Result<()> {
    let path = dir.join(MARKER_FILENAME);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return write_marker(dir, kind),
        Err(e) => return Err(e.into()),
    };

    let found = if bytes.len() == 5 && &bytes[0..4] == MARKER_MAGIC {
        CollectionKind::from_byte(bytes[4])
    } else {
        None
    };

    match (found, mode) {
        (Some(found), _) if found == kind => Ok(()),
        (Some(found), _) => Err(AtlasQError::IncompatibleType {
            expected: kind,
            found,
        }),
        (None, OpenMode::Strict) => Err(AtlasQError::Corrupted(
            "collection type marker is unreadable".to_string(),
        )),
        (None, OpenMode::Recover) => {
            warn!(dir = %dir.display(), %kind, "rewriting unreadable collection type marker");
            write_marker(dir, kind)
        }
    }
}

fn write_marker(dir: &Path, kind: CollectionKind) -> Result<()> {
    let mut bytes = MARKER_MAGIC.to_vec();
    bytes.push(kind as u8);
    fs::write(dir.join(MARKER_FILENAME), bytes)?;
    Ok(())
}

/// Delete a collection's storage directory. A missing directory is fine.
pub fn remove_dir(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {
            info!(dir = %dir.display(), "dropped collection");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Close a collection's store, if it is still held
///
/// The handle is released even when the final flush fails.
pub(crate) fn close_store(store: &mut Option<Box<dyn SortedStore>>) -> Result<()> {
    match store.take() {
        Some(store) => store.close(),
        None => Ok(()),
    }
}
