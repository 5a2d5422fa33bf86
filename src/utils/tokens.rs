//! Opaque token generation and hashing
//!
//! Bearer, refresh, and reset tokens are 32 bytes from the OS random source
//! (256 bits of entropy), base64url-encoded for transport. Uniqueness is
//! guaranteed by entropy, never by check-then-insert against the store.
//! Only the SHA-256 digest is persisted, so a leaked database does not leak
//! usable credentials.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

const TOKEN_BYTES: usize = 32;

/// Generate a new opaque token
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a token for storage and lookup
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
    }

    #[test]
    fn test_token_length() {
        // 32 bytes -> 43 base64url chars without padding
        assert_eq!(generate_token().len(), 43);
    }

    #[test]
    fn test_hash_is_stable() {
        let token = generate_token();
        assert_eq!(hash_token(&token), hash_token(&token));
    }

    #[test]
    fn test_hash_differs_per_token() {
        assert_ne!(hash_token("a"), hash_token("b"));
    }
}
