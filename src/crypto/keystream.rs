//! Keystream cipher
//!
//! The keystream is the extendable output of BLAKE3 keyed with the cipher
//! key. Applying it XORs the next keystream bytes into a buffer, so
//! encryption and decryption are the same operation as long as both sides
//! process the same byte positions in order.

use crate::crypto::CipherKey;

/// Scratch size for keystream generation
const KEYSTREAM_CHUNK: usize = 4096;

/// Stateful keystream positioned at the next unused byte
pub struct Keystream {
    reader: blake3::OutputReader,
    scratch: [u8; KEYSTREAM_CHUNK],
}

impl Keystream {
    /// Start a keystream at position zero
    pub fn new(key: &CipherKey) -> Self {
        let reader = blake3::Hasher::new_keyed(key.key()).finalize_xof();
        Keystream {
            reader,
            scratch: [0u8; KEYSTREAM_CHUNK],
        }
    }

    /// XOR the next `buf.len()` keystream bytes into `buf`
    pub fn apply(&mut self, buf: &mut [u8]) {
        for chunk in buf.chunks_mut(KEYSTREAM_CHUNK) {
            let stream = &mut self.scratch[..chunk.len()];
            self.reader.fill(stream);
            for (byte, k) in chunk.iter_mut().zip(stream.iter()) {
                *byte ^= k;
            }
        }
    }
}

impl Drop for Keystream {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.scratch.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> CipherKey {
        CipherKey::from_passphrase(b"correct horse").unwrap()
    }

    #[test]
    fn test_apply_twice_restores() {
        let plaintext = b"Hello, tristripe!".to_vec();
        let mut data = plaintext.clone();

        Keystream::new(&key()).apply(&mut data);
        assert_ne!(data, plaintext);

        Keystream::new(&key()).apply(&mut data);
        assert_eq!(data, plaintext);
    }

    #[test]
    fn test_chunking_is_transparent() {
        let mut whole = vec![0u8; 10_000];
        Keystream::new(&key()).apply(&mut whole);

        let mut pieces = vec![0u8; 10_000];
        let mut stream = Keystream::new(&key());
        for piece in pieces.chunks_mut(333) {
            stream.apply(piece);
        }
        assert_eq!(whole, pieces);
    }

    #[test]
    fn test_different_keys_differ() {
        let mut a = vec![0u8; 64];
        let mut b = vec![0u8; 64];
        Keystream::new(&key()).apply(&mut a);
        Keystream::new(&CipherKey::from_passphrase(b"wrong").unwrap()).apply(&mut b);
        assert_ne!(a, b);
    }
}
