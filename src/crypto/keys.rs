//! Cipher key handling
//!
//! The user supplies an arbitrary key string; the cipher key is derived from
//! it with BLAKE3 key derivation and wiped from memory on drop.

use crate::crypto::KEY_SIZE;
use zeroize::Zeroizing;

/// Context string for key derivation
const KEY_CONTEXT: &str = "tristripe 2024-01-01 member keystream v1";

/// Key material for the stripe keystream
#[derive(Clone)]
pub struct CipherKey {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl CipherKey {
    /// Derive a key from a user-provided key string
    ///
    /// Returns `None` for an empty key, which disables encryption.
    pub fn from_passphrase(passphrase: &[u8]) -> Option<Self> {
        if passphrase.is_empty() {
            return None;
        }
        Some(CipherKey {
            key: Zeroizing::new(blake3::derive_key(KEY_CONTEXT, passphrase)),
        })
    }

    /// Get the raw key bytes
    pub fn key(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl std::fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CipherKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_passphrase_disables() {
        assert!(CipherKey::from_passphrase(b"").is_none());
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let a = CipherKey::from_passphrase(b"secret").unwrap();
        let b = CipherKey::from_passphrase(b"secret").unwrap();
        let c = CipherKey::from_passphrase(b"other").unwrap();
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
    }

    #[test]
    fn test_debug_hides_key() {
        let key = CipherKey::from_passphrase(b"secret").unwrap();
        assert_eq!(format!("{:?}", key), "CipherKey(..)");
    }
}
