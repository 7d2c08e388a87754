//! Content-addressed entry key generation.

use sha2::{Digest, Sha256};

/// Compute the storage key for a request identity.
///
/// The identity is the canonical request URL; hashing keeps the primary key
/// fixed-width regardless of query length.
pub fn compute_cache_key(identity: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identity.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_stability() {
        let hash1 = compute_cache_key("https://example.com/style.css");
        let hash2 = compute_cache_key("https://example.com/style.css");
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_query_is_significant() {
        let plain = compute_cache_key("https://example.com/style.css");
        let versioned = compute_cache_key("https://example.com/style.css?v=techtalks-v6-2026-10-18");
        assert_ne!(plain, versioned);
    }

    #[test]
    fn test_hash_format() {
        let hash = compute_cache_key("https://example.com/");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
