//! Canonical JSON serialization and SHA-256 hashing helpers.
//!
//! Input hashes, output hashes, and chain link hashes are all the first
//! 16 hex characters (64 bits) of SHA-256 over UTF-8 bytes. Hashes over
//! structured values are computed on canonical JSON: sorted keys, no
//! whitespace. Do not pretty-print anything that gets hashed.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::WardenResult;

/// Number of hex characters kept from a SHA-256 digest for wire hashes.
pub const SHORT_HASH_LEN: usize = 16;

/// Serialize a value to canonical JSON bytes: stable key ordering
/// (enforced via a `Value` roundtrip), no whitespace, UTF-8.
pub fn canonical_json_bytes<T: Serialize>(value: &T) -> WardenResult<Vec<u8>> {
    let v = serde_json::to_value(value)?;
    let sorted = sort_json_value(v);
    Ok(serde_json::to_vec(&sorted)?)
}

/// Full hex-encoded SHA-256 of raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Truncated wire hash: first 16 hex characters of SHA-256 over raw bytes.
pub fn short_hash(bytes: &[u8]) -> String {
    let mut h = sha256_hex(bytes);
    h.truncate(SHORT_HASH_LEN);
    h
}

/// Truncated wire hash of a value's canonical JSON serialization.
pub fn short_hash_canonical<T: Serialize>(value: &T) -> WardenResult<String> {
    Ok(short_hash(&canonical_json_bytes(value)?))
}

fn sort_json_value(v: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;
    match v {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut out = serde_json::Map::new();
            for (k, v) in entries {
                out.insert(k, sort_json_value(v));
            }
            Value::Object(out)
        }
        Value::Array(arr) => Value::Array(arr.into_iter().map(sort_json_value).collect()),
        other => other,
    }
}
