//! Member set health
//!
//! Classifies each member against the digests of a metadata record and
//! derives the state of the whole set from that.

use serde::{Deserialize, Serialize};
use std::io::{Read, Seek};
use tracing::debug;

use crate::crypto::Digest;
use crate::error::Result;
use crate::raid::member::{Member, MEMBER_COUNT};
use crate::raid::metadata::{measure_members, MetadataRecord, METADATA_VERSION};

/// Status of a single member
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    /// Present and matching its recorded digest
    Healthy,
    /// Could not be opened
    Missing,
    /// Present but its content does not match the record
    Corrupted,
}

/// Health information for a single member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberHealth {
    pub member: Member,
    pub status: MemberStatus,
    /// Measured length in bytes, if the member was readable
    pub length: Option<u64>,
    /// Digest stored in the record
    pub expected: Digest,
    /// Digest of the member's current content
    pub actual: Option<Digest>,
}

impl MemberHealth {
    fn classify(member: Member, expected: Digest, observed: Option<(Digest, u64)>) -> Self {
        let status = match observed {
            None => MemberStatus::Missing,
            Some((digest, _)) if digest == expected => MemberStatus::Healthy,
            Some(_) => MemberStatus::Corrupted,
        };
        Self {
            member,
            status,
            length: observed.map(|(_, len)| len),
            expected,
            actual: observed.map(|(digest, _)| digest),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == MemberStatus::Healthy
    }
}

/// Overall member set status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArrayStatus {
    /// All members intact
    Healthy,
    /// One member lost, the stream is still recoverable
    Degraded,
    /// The stream cannot be recovered
    Failed,
}

/// Health of a member set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayHealth {
    pub status: ArrayStatus,
    pub members: Vec<MemberHealth>,
    /// Version found in the record
    pub version: u8,
    /// Why the set is unrecoverable, if it is
    pub reason: Option<String>,
}

impl ArrayHealth {
    /// Rehash every available member and classify it against `record`
    ///
    /// Read positions are restored afterwards.
    pub fn assess<R: Read + Seek>(
        record: &MetadataRecord,
        members: &mut [Option<R>; MEMBER_COUNT],
    ) -> Result<Self> {
        let observed = measure_members(members)?;
        for (member, measured) in Member::ALL.into_iter().zip(&observed) {
            if let Some((_, len)) = measured {
                debug!("{}: {} bytes", member, len);
            }
        }
        Ok(Self::from_observations(record, observed))
    }

    /// Classify members from already measured digests and lengths
    pub fn from_observations(
        record: &MetadataRecord,
        observed: [Option<(Digest, u64)>; MEMBER_COUNT],
    ) -> Self {
        let members: Vec<MemberHealth> = Member::ALL
            .into_iter()
            .map(|m| MemberHealth::classify(m, *record.member_digest(m), observed[m.index()]))
            .collect();

        let lost = members.iter().filter(|m| !m.is_healthy()).count();
        let (status, reason) = if record.version != METADATA_VERSION {
            (
                ArrayStatus::Failed,
                Some(format!("unsupported metadata version {:02x}", record.version)),
            )
        } else {
            match lost {
                0 => (ArrayStatus::Healthy, None),
                1 => (ArrayStatus::Degraded, None),
                n => (
                    ArrayStatus::Failed,
                    Some(format!("{} of {} members lost", n, MEMBER_COUNT)),
                ),
            }
        };

        Self {
            status,
            members,
            version: record.version,
            reason,
        }
    }

    /// Health of one member
    pub fn member(&self, member: Member) -> &MemberHealth {
        &self.members[member.index()]
    }

    /// Members that are present and intact
    pub fn healthy_members(&self) -> Vec<Member> {
        self.members
            .iter()
            .filter(|m| m.is_healthy())
            .map(|m| m.member)
            .collect()
    }

    pub fn healthy_count(&self) -> usize {
        self.members.iter().filter(|m| m.is_healthy()).count()
    }

    /// The single member a merge would reconstruct around
    pub fn failed_member(&self) -> Option<Member> {
        match self.status {
            ArrayStatus::Degraded => self
                .members
                .iter()
                .find(|m| !m.is_healthy())
                .map(|m| m.member),
            _ => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.status == ArrayStatus::Degraded
    }

    /// Whether a merge can succeed
    pub fn can_operate(&self) -> bool {
        self.status != ArrayStatus::Failed
    }
}
