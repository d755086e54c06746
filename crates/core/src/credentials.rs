//! API key hashing.
//!
//! Team keys are stored and looked up by their SHA-256 hex digest; the
//! plaintext key never reaches the database.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 digest of `key`.
pub fn hash_api_key(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    format!("{digest:x}")
}

/// Compare two keys by digest so timing does not depend on a shared prefix.
pub fn keys_match(presented: &str, expected: &str) -> bool {
    Sha256::digest(presented.as_bytes()) == Sha256::digest(expected.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_hex() {
        let hash = hash_api_key("team-secret");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, hash_api_key("team-secret"));
        assert_ne!(hash, hash_api_key("team-secret2"));
    }

    #[test]
    fn keys_match_only_on_equal_input() {
        assert!(keys_match("admin", "admin"));
        assert!(!keys_match("admin", "admin "));
    }
}
