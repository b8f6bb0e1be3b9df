//! Records returned by the collections
//!
//! Values are opaque bytes. The helpers here encode structured values with
//! bincode (compact binary) or serde_json (human-readable text) on the way in
//! and decode them on the way out.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{AtlasQError, Result};

/// An entry in a queue or stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Sequence ID, unique within the collection and never reused
    pub id: u64,
    /// Store key the value lives under
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// An entry in a priority queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityItem {
    /// Sequence ID within the item's priority level
    pub id: u64,
    pub priority: u8,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// An entry in a prefix queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixItem {
    /// Sequence ID within the item's prefix group
    pub id: u64,
    pub prefix: Vec<u8>,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Shared decoding helpers for every record type
pub trait Payload {
    /// Raw value bytes
    fn value(&self) -> &[u8];

    /// Value as UTF-8 text
    fn as_str(&self) -> Result<&str> {
        std::str::from_utf8(self.value())
            .map_err(|e| AtlasQError::Serialization(format!("value is not UTF-8: {}", e)))
    }

    /// Decode a value written with one of the `*_object` helpers
    fn to_object<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(bincode::deserialize(self.value())?)
    }

    /// Decode a value written with one of the `*_object_as_json` helpers
    fn to_object_from_json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(self.value())?)
    }
}

impl Payload for Item {
    fn value(&self) -> &[u8] {
        &self.value
    }
}

impl Payload for PriorityItem {
    fn value(&self) -> &[u8] {
        &self.value
    }
}

impl Payload for PrefixItem {
    fn value(&self) -> &[u8] {
        &self.value
    }
}

/// A record from any collection, keeping its priority or prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Item(Item),
    Priority(PriorityItem),
    Prefix(PrefixItem),
}

impl Record {
    /// Sequence ID within the record's queue, stack, level, or group
    pub fn id(&self) -> u64 {
        match self {
            Record::Item(item) => item.id,
            Record::Priority(item) => item.id,
            Record::Prefix(item) => item.id,
        }
    }

    pub fn key(&self) -> &[u8] {
        match self {
            Record::Item(item) => &item.key,
            Record::Priority(item) => &item.key,
            Record::Prefix(item) => &item.key,
        }
    }
}

impl Payload for Record {
    fn value(&self) -> &[u8] {
        match self {
            Record::Item(item) => &item.value,
            Record::Priority(item) => &item.value,
            Record::Prefix(item) => &item.value,
        }
    }
}

impl From<Item> for Record {
    fn from(item: Item) -> Self {
        Record::Item(item)
    }
}

impl From<PriorityItem> for Record {
    fn from(item: PriorityItem) -> Self {
        Record::Priority(item)
    }
}

impl From<PrefixItem> for Record {
    fn from(item: PrefixItem) -> Self {
        Record::Prefix(item)
    }
}

/// Binary encoding used by the `*_object` helpers
pub fn encode_object<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

/// Text encoding used by the `*_object_as_json` helpers
pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}
