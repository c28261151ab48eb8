//! Versioned envelope for cached response bodies.
//!
//! Every cache entry follows this format:
//! ```text
//! ┌─────────────────┬─────────────────┬──────────────────────────┐
//! │  MAGIC (4 bytes)│VERSION (4 bytes)│   JSON PAYLOAD (N bytes) │
//! └─────────────────┴─────────────────┴──────────────────────────┘
//!   "RAPI"              u32 (LE)           serde_json::to_vec(T)
//! ```
//!
//! Magic and version are checked on every read. An entry that fails either
//! check is evicted by the caller and recomputed from the store.

use crate::error::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};

/// Magic header for response cache entries.
pub const CACHE_MAGIC: [u8; 4] = *b"RAPI";

/// Current envelope version.
///
/// Increment when the shape of cached responses changes, so entries written
/// by an older build are evicted instead of served.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

const HEADER_LEN: usize = 8;

/// Serialize a value with envelope for cache storage.
///
/// # Errors
///
/// Returns `Error::Serialization` if JSON encoding fails.
pub fn serialize_for_cache<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(value).map_err(|e| {
        error!("Cache serialization failed: {}", e);
        Error::Serialization(e.to_string())
    })?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&CACHE_MAGIC);
    bytes.extend_from_slice(&CURRENT_SCHEMA_VERSION.to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Deserialize a value from cache storage with validation.
///
/// # Errors
///
/// - `Error::InvalidCacheEntry`: Truncated header or wrong magic
/// - `Error::VersionMismatch`: Written by another envelope version
/// - `Error::Serialization`: Corrupted JSON payload
pub fn deserialize_from_cache<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::InvalidCacheEntry(format!(
            "entry too short: {} bytes",
            bytes.len()
        )));
    }
    let (header, payload) = bytes.split_at(HEADER_LEN);

    if header[..4] != CACHE_MAGIC {
        warn!(
            "Invalid cache entry: expected magic {:?}, got {:?}",
            CACHE_MAGIC,
            &header[..4]
        );
        return Err(Error::InvalidCacheEntry(format!(
            "Invalid magic: expected {:?}, got {:?}",
            CACHE_MAGIC,
            &header[..4]
        )));
    }

    let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if version != CURRENT_SCHEMA_VERSION {
        warn!(
            "Cache version mismatch: expected {}, got {}",
            CURRENT_SCHEMA_VERSION, version
        );
        return Err(Error::VersionMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found: version,
        });
    }

    serde_json::from_slice(payload).map_err(|e| {
        error!("Cache deserialization failed: {}", e);
        Error::Serialization(e.to_string())
    })
}
