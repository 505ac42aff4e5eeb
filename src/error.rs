//! Error types for tristripe

use std::io;
use thiserror::Error;

use crate::raid::{Member, MetadataDiff};

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Buffers whose allocation can fail during a split or merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Per-member stripe buffers
    Member,
    /// Source chunk / reconstructed output buffer
    Input,
}

impl std::fmt::Display for BufferKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferKind::Member => write!(f, "member buffer"),
            BufferKind::Input => write!(f, "input buffer"),
        }
    }
}

/// Main error type for tristripe
#[derive(Error, Debug)]
pub enum Error {
    // Allocation errors
    #[error("Failed to allocate {0}")]
    Allocation(BufferKind),

    // Open errors
    #[error("Cannot open {member}: {source}")]
    OpenMember { member: Member, source: io::Error },

    #[error("Cannot open output: {0}")]
    OpenOutput(io::Error),

    #[error("Cannot open input: {0}")]
    OpenInput(io::Error),

    // Read / write errors
    #[error("Read from {member} failed: {source}")]
    MemberRead { member: Member, source: io::Error },

    #[error("Write to {member} failed: {source}")]
    MemberWrite { member: Member, source: io::Error },

    #[error("Read from source failed: {0}")]
    SourceRead(io::Error),

    #[error("Write to output failed: {0}")]
    OutputWrite(io::Error),

    // Codec errors
    #[error("Invalid block: {0}")]
    InvalidBlock(String),

    #[error("Reconstruction failed: {0}")]
    Reconstruction(String),

    // Metadata errors
    #[error("Metadata unavailable: {0}")]
    MetadataUnavailable(String),

    #[error("Malformed metadata record: {0}")]
    MalformedMetadata(String),

    #[error("Unsupported metadata version: expected {expected}, got {got}")]
    UnsupportedMetadataVersion { expected: u8, got: u8 },

    #[error("Cannot identify a single failed member (differs: {0})")]
    MetadataMismatch(MetadataDiff),

    #[error("Reconstructed stream digest mismatch: expected {expected}, got {got}")]
    DigestMismatch { expected: String, got: String },

    #[error("Metadata write failed: {0}")]
    MetadataWrite(io::Error),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Status codes reported across the bridge boundary.
pub mod code {
    pub const MEMERR_DEV: u8 = 0x10;
    pub const MEMERR_BUF: u8 = 0x17;

    pub const READERR_DEV0: u8 = 0x20;
    pub const READERR_IN: u8 = 0x29;

    pub const OPENERR_DEV0: u8 = 0x30;
    pub const OPENERR_OUT: u8 = 0x38;
    pub const OPENERR_IN: u8 = 0x39;

    pub const METADATA_ERROR: u8 = 0x40;

    pub const WRITEERR_DEV0: u8 = 0x50;
    pub const WRITEERR_OUT: u8 = 0x58;
    pub const WRITEERR_META: u8 = 0x5a;

    pub const CONFIG_ERROR: u8 = 0x60;
    pub const IO_ERROR: u8 = 0x70;
}

impl Error {
    /// Convert to the numeric status used by the command-line bridge
    pub fn code(&self) -> u8 {
        match self {
            Error::Allocation(kind) => match kind {
                BufferKind::Member => code::MEMERR_DEV,
                BufferKind::Input => code::MEMERR_BUF,
            },
            Error::OpenMember { member, .. } => code::OPENERR_DEV0 + member.index() as u8,
            Error::OpenOutput(_) => code::OPENERR_OUT,
            Error::OpenInput(_) => code::OPENERR_IN,
            Error::MemberRead { member, .. } => code::READERR_DEV0 + member.index() as u8,
            Error::MemberWrite { member, .. } => code::WRITEERR_DEV0 + member.index() as u8,
            Error::SourceRead(_) | Error::InvalidBlock(_) | Error::Reconstruction(_) => {
                code::READERR_IN
            }
            Error::OutputWrite(_) => code::WRITEERR_OUT,
            Error::MetadataUnavailable(_)
            | Error::MalformedMetadata(_)
            | Error::UnsupportedMetadataVersion { .. }
            | Error::MetadataMismatch(_)
            | Error::DigestMismatch { .. } => code::METADATA_ERROR,
            Error::MetadataWrite(_) => code::WRITEERR_META,
            Error::Config(_) | Error::InvalidConfig(_) => code::CONFIG_ERROR,
            Error::Io(_) => code::IO_ERROR,
        }
    }

    /// Whether this error comes from metadata validation
    pub fn is_metadata(&self) -> bool {
        self.code() == code::METADATA_ERROR
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_codes_follow_index() {
        let err = Error::MemberRead {
            member: Member::Member2,
            source: io::Error::new(io::ErrorKind::Other, "boom"),
        };
        assert_eq!(err.code(), 0x22);

        let err = Error::OpenMember {
            member: Member::Member1,
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert_eq!(err.code(), 0x31);
    }

    #[test]
    fn test_metadata_errors_share_code() {
        let err = Error::MetadataMismatch(MetadataDiff::MEMBER0 | MetadataDiff::MEMBER1);
        assert!(err.is_metadata());
        assert_eq!(err.code(), code::METADATA_ERROR);

        let err = Error::UnsupportedMetadataVersion { expected: 1, got: 7 };
        assert!(err.is_metadata());
    }

    #[test]
    fn test_allocation_codes() {
        assert_eq!(Error::Allocation(BufferKind::Member).code(), code::MEMERR_DEV);
        assert_eq!(Error::Allocation(BufferKind::Input).code(), code::MEMERR_BUF);
    }
}
