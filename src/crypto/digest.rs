//! Streaming BLAKE3 digests
//!
//! One accumulator is owned per stream (the original stream and each member)
//! and fed as bytes pass through the pipeline.

use crate::crypto::{DIGEST_HEX_LEN, DIGEST_SIZE};
use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::io::{self, Read};

/// Fixed-length content digest
///
/// The all-zero digest marks "not computed".
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Digest([u8; DIGEST_SIZE]);

impl Digest {
    /// The zeroed digest of a fresh record
    pub const ZERO: Digest = Digest([0u8; DIGEST_SIZE]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; DIGEST_SIZE]
    }

    /// Lowercase hex form (64 characters)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse the 64-character hex form
    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() != DIGEST_HEX_LEN {
            return Err(Error::MalformedMetadata(format!(
                "digest must be {} hex characters, got {}",
                DIGEST_HEX_LEN,
                s.len()
            )));
        }
        let mut bytes = [0u8; DIGEST_SIZE];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| Error::MalformedMetadata(format!("invalid digest '{}': {}", s, e)))?;
        Ok(Digest(bytes))
    }

    /// Digest of an in-memory buffer
    pub fn of(data: &[u8]) -> Self {
        let mut digest = StreamDigest::new();
        digest.update(data);
        digest.finalize()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Digest::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Incremental digest accumulator
#[derive(Clone, Default)]
pub struct StreamDigest {
    hasher: blake3::Hasher,
    len: u64,
}

impl StreamDigest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the accumulator
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.len += data.len() as u64;
    }

    /// Number of bytes fed so far
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Finish and return the digest
    pub fn finalize(&self) -> Digest {
        Digest(*self.hasher.finalize().as_bytes())
    }

    /// Digest everything a reader yields, returning the digest and byte count
    pub fn of_reader<R: Read>(mut reader: R) -> io::Result<(Digest, u64)> {
        let mut digest = StreamDigest::new();
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => digest.update(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok((digest.finalize(), digest.len()))
    }
}
