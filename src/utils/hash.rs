//! Hashing helpers for idempotency and cache keys

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of the input.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Short (16 hex chars) digest for log-friendly keys.
pub fn short_hash(input: &str) -> String {
    sha256_hex(input)[..16].to_string()
}

/// Collapse whitespace and lowercase for stable query hashing. This is the
/// only normalisation applied before a query participates in a key.
pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_collapses_whitespace_and_case() {
        assert_eq!(normalize_query("  Pizza   Tel Aviv "), "pizza tel aviv");
        assert_eq!(normalize_query("מסעדות  איטלקיות"), "מסעדות איטלקיות");
    }

    #[test]
    fn hashes_are_stable() {
        assert_eq!(sha256_hex("abc"), sha256_hex("abc"));
        assert_ne!(sha256_hex("abc"), sha256_hex("abd"));
        assert_eq!(short_hash("abc").len(), 16);
    }
}
