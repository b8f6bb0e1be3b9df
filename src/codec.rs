//! Key Codec
//!
//! Maps sequence IDs to store keys. IDs are encoded big-endian so that the
//! store's byte-lexicographic order is numeric ID order.
//!
//! ```text
//! Queue / Stack     [id: u64 BE]
//! Priority level    [priority: u8][':'][id: u64 BE]
//! Prefix group      [prefix ...][':'][id: u64 BE]
//! ```
//!
//! Prefixes must not end in a way that makes `prefix ++ ':'` a prefix of
//! another group's `prefix ++ ':'`; this is not checked.

use crate::error::{AtlasQError, Result};

/// Separator between a level/prefix and the encoded ID
pub const SEPARATOR: u8 = b':';

/// Length of an encoded ID
pub const ID_LEN: usize = 8;

/// Length of a priority level prefix
pub const LEVEL_PREFIX_LEN: usize = 2;

pub fn id_to_key(id: u64) -> [u8; ID_LEN] {
    id.to_be_bytes()
}

/// Inverse of [`id_to_key`]
pub fn key_to_id(key: &[u8]) -> Result<u64> {
    let bytes: [u8; ID_LEN] = key.try_into().map_err(|_| {
        AtlasQError::Storage(format!(
            "expected an {}-byte ID key, got {} bytes",
            ID_LEN,
            key.len()
        ))
    })?;
    Ok(u64::from_be_bytes(bytes))
}

/// `[priority, SEPARATOR]`
pub fn level_prefix(priority: u8) -> [u8; LEVEL_PREFIX_LEN] {
    [priority, SEPARATOR]
}

pub fn level_key(priority: u8, id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(LEVEL_PREFIX_LEN + ID_LEN);
    key.extend_from_slice(&level_prefix(priority));
    key.extend_from_slice(&id_to_key(id));
    key
}

/// Split a priority key into `(priority, id)`
pub fn split_level_key(key: &[u8]) -> Result<(u8, u64)> {
    if key.len() != LEVEL_PREFIX_LEN + ID_LEN || key[1] != SEPARATOR {
        return Err(AtlasQError::Storage(format!(
            "malformed priority key of {} bytes",
            key.len()
        )));
    }
    Ok((key[0], key_to_id(&key[LEVEL_PREFIX_LEN..])?))
}

pub fn prefixed_key(prefix: &[u8], id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 1 + ID_LEN);
    key.extend_from_slice(prefix);
    key.push(SEPARATOR);
    key.extend_from_slice(&id_to_key(id));
    key
}

/// Split a prefixed key into `(prefix, id)`
pub fn split_prefixed_key(key: &[u8]) -> Result<(&[u8], u64)> {
    if key.len() < 1 + ID_LEN + 1 {
        return Err(AtlasQError::Storage(format!(
            "prefixed key of {} bytes is too short",
            key.len()
        )));
    }
    let sep = key.len() - ID_LEN - 1;
    if key[sep] != SEPARATOR {
        return Err(AtlasQError::Storage("prefixed key lacks a separator".to_string()));
    }
    Ok((&key[..sep], key_to_id(&key[sep + 1..])?))
}
