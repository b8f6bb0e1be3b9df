//! Storage Module
//!
//! Persistent storage layer using an SSTable-like format.
//!
//! ## Responsibilities
//! - Persist flushed memtables to disk in sorted format
//! - Point lookups through in-memory per-table indexes
//! - Track the live table set in a checksummed MANIFEST
//! - Compact all tables into one when too many accumulate
//! - Detect damaged files and rebuild the table set on recovery

mod manager;
mod manifest;
mod sstable;

pub use manager::StorageManager;
pub use manifest::{Manifest, MANIFEST_FILENAME};
pub use sstable::{SSTable, SSTableBuilder, SSTableReader};
