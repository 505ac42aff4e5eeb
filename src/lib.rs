//! tristripe - Three-member striping with rotating parity
//!
//! This library splits a byte stream across three members so that any one of
//! them can be lost, optionally encrypting the data first, and records a
//! digest per member so a merge can tell which member to reconstruct around.

pub mod config;
pub mod crypto;
pub mod error;
pub mod fs;
pub mod raid;

pub use config::Config;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crypto::CipherKey;
    pub use crate::error::{Error, Result};
    pub use crate::fs::MemberSet;
    pub use crate::raid::{ArrayHealth, Member, MergeReport, MetadataRecord, Pipeline};
}
