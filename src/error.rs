//! Error types for AtlasQ
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

use crate::item::Record;
use crate::lifecycle::CollectionKind;

/// Result type alias using AtlasQError
pub type Result<T> = std::result::Result<T, AtlasQError>;

/// Unified error type for AtlasQ operations
#[derive(Debug, Error)]
pub enum AtlasQError {
    // -------------------------------------------------------------------------
    // Collection Errors
    // -------------------------------------------------------------------------
    #[error("The collection is empty")]
    Empty,

    #[error("ID used is out of the range of the collection")]
    OutOfRange,

    #[error("The collection is closed")]
    Closed,

    #[error("Incompatible collection type: expected {expected}, found {found}")]
    IncompatibleType {
        expected: CollectionKind,
        found: CollectionKind,
    },

    #[error("Prefix must be at least one byte")]
    EmptyPrefix,

    /// The record was read but its removal from the store failed. Bounds were
    /// not advanced, so the record is still live in the collection.
    #[error("Item {} was read but could not be removed: {source}", .item.id())]
    DequeueIncomplete {
        item: Box<Record>,
        #[source]
        source: Box<AtlasQError>,
    },

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Store corruption detected: {0}")]
    Corrupted(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Key not found")]
    KeyNotFound,

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AtlasQError {
    /// Whether this error means the backing store is damaged and
    /// `recover` should be used to open it.
    pub fn is_corrupted(&self) -> bool {
        matches!(self, AtlasQError::Corrupted(_))
    }
}

impl From<bincode::Error> for AtlasQError {
    fn from(e: bincode::Error) -> Self {
        AtlasQError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for AtlasQError {
    fn from(e: serde_json::Error) -> Self {
        AtlasQError::Serialization(e.to_string())
    }
}
