//! Three-member rotating-parity striping
//!
//! Data is split into rounds of two blocks. Each round writes a primary,
//! secondary and parity segment to three members, with the parity role
//! rotating one member per round. Any single member can be lost and the
//! stream still reconstructed.

pub mod block;
pub mod health;
pub mod member;
pub mod metadata;
pub mod pipeline;

mod proptest;

pub use block::{BlockCodec, RoundSegments, StripeTriple, DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE};
pub use health::{ArrayHealth, ArrayStatus, MemberHealth, MemberStatus};
pub use member::{Member, ParitySlot, Role, MEMBER_COUNT};
pub use metadata::{infer_failed_member, MetadataDiff, MetadataRecord, METADATA_VERSION};
pub use pipeline::{MergeReport, Pipeline};
