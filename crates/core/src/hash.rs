//! Canonical Content Addressing
//!
//! SHA-256 hashing over a canonically serialized JSON payload. Used by
//! the research retriever's response cache so that an identical request
//! always maps to the same cache entry across runs.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hash a JSON payload into a lowercase hex digest.
///
/// `serde_json::Value` objects are backed by a `BTreeMap`, so map keys
/// serialize in sorted order and the digest is independent of insertion
/// order. The payload must be content-only: no timestamps, counters, or
/// other run-varying fields.
pub fn hash_payload(payload: &Value) -> String {
    let blob = serde_json::to_vec(payload).unwrap_or_default();
    let digest = Sha256::digest(&blob);
    hex_string(&digest)
}

fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}
