//! Request identity hashing.

use sha2::{Digest, Sha256};

/// Compute the cache key for a request identity.
///
/// The URL is expected to be normalized already; the key is only as stable
/// as its input.
pub fn compute_cache_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
