//! Shared-secret key derivation.
//!
//! Key = `SHA-256(secret)`. Client and server configured with the same
//! secret string derive the same key, which is the only thing either side
//! needs to agree on.

use sha2::{Digest, Sha256};
use std::fmt;

/// Length of a derived key in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// A 256-bit symmetric key derived from the configured shared secret.
///
/// Derived once at startup and shared read-only by every session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey([u8; KEY_LEN]);

impl SessionKey {
    /// Derive a key from a shared secret string.
    pub fn derive(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&digest);
        Self(key)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Short non-reversible fingerprint for logs: the first 8 hex chars of
    /// `SHA-256(key)`.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        hex::encode(&digest[..4])
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionKey").field(&self.fingerprint()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_sha256_of_secret() {
        let key = SessionKey::derive("test-key");
        assert_eq!(
            hex::encode(key.as_bytes()),
            "62af8704764faf8ea82fc61ce9c4c3908b6cb97d463a634e9e587d7c885db0ef"
        );
    }

    #[test]
    fn derive_is_deterministic() {
        assert_eq!(SessionKey::derive("same"), SessionKey::derive("same"));
        assert_ne!(SessionKey::derive("one"), SessionKey::derive("two"));
    }

    #[test]
    fn empty_secret_is_valid() {
        let key = SessionKey::derive("");
        assert_eq!(
            hex::encode(key.as_bytes()),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn fingerprint_is_short_hash_of_key() {
        let key = SessionKey::derive("test-key");
        assert_eq!(key.fingerprint(), "057e4f92");
    }

    #[test]
    fn debug_hides_key_material() {
        let key = SessionKey::derive("test-key");
        let dbg = format!("{key:?}");
        assert!(!dbg.contains("62af8704"));
        assert!(dbg.contains("057e4f92"));
    }
}
