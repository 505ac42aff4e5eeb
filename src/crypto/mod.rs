//! Cryptography module for tristripe
//!
//! Provides the streaming content digest used by the metadata record and the
//! keystream cipher applied to data before it is striped.
//! Both are built on BLAKE3.

mod digest;
mod keys;
mod keystream;

pub use digest::{Digest, StreamDigest};
pub use keys::CipherKey;
pub use keystream::Keystream;

/// Size of a digest in bytes
pub const DIGEST_SIZE: usize = 32;

/// Length of a hex-encoded digest
pub const DIGEST_HEX_LEN: usize = 2 * DIGEST_SIZE;

/// Size of the derived cipher key in bytes
pub const KEY_SIZE: usize = 32;
