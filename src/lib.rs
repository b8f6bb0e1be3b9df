//! # AtlasQ
//!
//! Embedded, persistent collections over a durable sorted key-value store:
//! - `Queue` (FIFO) and `Stack` (LIFO)
//! - `PriorityQueue` with 256 FIFO levels served in ascending or descending order
//! - `PrefixQueue` with independent FIFO groups named by byte prefixes
//!
//! Every collection owns one storage directory. Records survive restarts,
//! and the in-memory bounds are rebuilt from the stored keys on open.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │      Queue   │   Stack   │  PriorityQueue  │  PrefixQueue    │
//! │           (RwLock<bounds + store handle>)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  key codec: BE ids, level / prefix keys
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                 SortedStore (Engine)                          │
//! │        get / put / delete / ordered prefix iteration          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │     WAL     │          │  MemTable   │
//!   │  (Append)   │          │  (BTreeMap) │
//!   └─────────────┘          └──────┬──────┘
//!                                   │
//!                                   ▼
//!                           ┌─────────────┐
//!                           │   Storage   │
//!                           │ (SSTables + │
//!                           │  MANIFEST)  │
//!                           └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use atlasq::{Payload, Queue};
//!
//! # fn main() -> atlasq::Result<()> {
//! let queue = Queue::open("/tmp/jobs")?;
//! queue.enqueue_str("resize image 42")?;
//!
//! let item = queue.dequeue()?;
//! assert_eq!(item.as_str()?, "resize image 42");
//! queue.close()?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod item;
pub mod bounds;
pub mod lifecycle;

pub mod store;
pub mod engine;
pub mod wal;
pub mod memtable;
pub mod storage;

pub mod queue;
pub mod stack;
pub mod priority;
pub mod prefix;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{AtlasQError, Result};
pub use config::{Config, WalSyncStrategy};
pub use engine::Engine;
pub use item::{Item, Payload, PrefixItem, PriorityItem, Record};
pub use lifecycle::{Collection, CollectionKind};
pub use store::{OpenMode, SortedStore};

pub use queue::Queue;
pub use stack::Stack;
pub use priority::{Order, PriorityQueue};
pub use prefix::PrefixQueue;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of AtlasQ
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
