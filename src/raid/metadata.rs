//! Metadata record for a member set
//!
//! The record is written once at the end of a split and read once at the
//! start of a merge. It holds one digest per member, a digest of the
//! (possibly encrypted) original stream and the missing count: the byte-length
//! asymmetry between the longest and shortest member.
//!
//! The persisted layout is fixed-width text without delimiters:
//! `version` (2 hex) | member0 | member1 | member2 | original (64 hex each) |
//! `missing` (4 hex).
//!
//! The missing count only ever applies to the terminal round of a merge. This
//! holds because a split can only produce a partial round at the very end of
//! the stream; the record does not encode it independently.

use crate::crypto::{Digest, StreamDigest, DIGEST_HEX_LEN};
use crate::error::{Error, Result};
use crate::raid::member::{Member, MEMBER_COUNT};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::BitOr;
use tracing::debug;

/// Version written into new records
pub const METADATA_VERSION: u8 = 1;

/// Length of the persisted record in bytes
pub const RECORD_LEN: usize = 2 + 4 * DIGEST_HEX_LEN + 4;

/// Largest missing count the record can hold
pub const MAX_MISSING: u64 = 0xFFFF;

/// Persisted description of a member set
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Record format version
    pub version: u8,

    /// Digest of each member, indexed by member
    pub members: [Digest; MEMBER_COUNT],

    /// Digest of the original stream (after encryption, if enabled)
    pub original: Digest,

    /// Longest minus shortest member length at split time
    pub missing: u64,
}

impl MetadataRecord {
    /// Create a zeroed record
    pub fn new() -> Self {
        Self::default()
    }

    /// Digest recorded for a member
    pub fn member_digest(&self, member: Member) -> &Digest {
        &self.members[member.index()]
    }

    /// Set the digest for a member
    pub fn set_member_digest(&mut self, member: Member, digest: Digest) {
        self.members[member.index()] = digest;
    }

    /// Encode into the fixed-width persisted layout
    pub fn encode(&self) -> Result<String> {
        if self.missing > MAX_MISSING {
            return Err(Error::MalformedMetadata(format!(
                "missing count {} does not fit the record",
                self.missing
            )));
        }

        let mut out = String::with_capacity(RECORD_LEN);
        out.push_str(&format!("{:02x}", self.version));
        for digest in &self.members {
            out.push_str(&digest.to_hex());
        }
        out.push_str(&self.original.to_hex());
        out.push_str(&format!("{:04x}", self.missing));
        Ok(out)
    }

    /// Parse the fixed-width persisted layout
    ///
    /// Trailing whitespace is ignored.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim_end();
        if s.len() != RECORD_LEN || !s.is_ascii() {
            return Err(Error::MalformedMetadata(format!(
                "record must be {} ASCII characters, got {}",
                RECORD_LEN,
                s.len()
            )));
        }

        let version = hex_field(&s[..2], "version")? as u8;

        let digest_at = |field: usize| {
            let start = 2 + field * DIGEST_HEX_LEN;
            Digest::from_hex(&s[start..start + DIGEST_HEX_LEN])
        };
        let members = [digest_at(0)?, digest_at(1)?, digest_at(2)?];
        let original = digest_at(3)?;

        let missing = hex_field(&s[RECORD_LEN - 4..], "missing count")?;

        Ok(MetadataRecord {
            version,
            members,
            original,
            missing,
        })
    }

    /// Write the persisted layout
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        let encoded = self.encode()?;
        writer
            .write_all(encoded.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(Error::MetadataWrite)
    }

    /// Read a persisted record
    pub fn read_from<R: Read>(reader: R) -> Result<Self> {
        let mut content = String::new();
        reader
            .take(RECORD_LEN as u64 + 64)
            .read_to_string(&mut content)
            .map_err(|e| Error::MetadataUnavailable(e.to_string()))?;
        Self::parse(&content)
    }

    /// Compare two records field by field
    pub fn diff(&self, other: &MetadataRecord) -> MetadataDiff {
        let mut diff = MetadataDiff::NONE;
        for member in Member::ALL {
            if self.member_digest(member) != other.member_digest(member) {
                diff = diff | MetadataDiff::member(member);
            }
        }
        if self.original != other.original {
            diff = diff | MetadataDiff::ORIGINAL;
        }
        if self.version != other.version {
            diff = diff | MetadataDiff::VERSION;
        }
        if self.missing != other.missing {
            diff = diff | MetadataDiff::MISSING;
        }
        diff
    }

    /// Recompute a record from the members that are currently accessible
    ///
    /// Each accessible member is rehashed from its start and its length
    /// measured; its read position is restored afterwards. Inaccessible members
    /// keep a zeroed digest. `missing` receives the last measured length, so it
    /// only matches the persisted value by coincidence; inference ignores it.
    pub fn recompute<R: Read + Seek>(members: &mut [Option<R>; MEMBER_COUNT]) -> Result<Self> {
        let mut record = MetadataRecord {
            version: METADATA_VERSION,
            ..Self::default()
        };

        for (member, measured) in Member::ALL.into_iter().zip(measure_members(members)?) {
            let Some((digest, len)) = measured else {
                continue;
            };
            debug!("Recomputed {}: {} bytes, digest {}", member, len, digest);
            record.set_member_digest(member, digest);
            record.missing = len;
        }

        Ok(record)
    }
}

/// Parse a fixed-width hex field, digits only
fn hex_field(field: &str, name: &str) -> Result<u64> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::MalformedMetadata(format!(
            "invalid {}: '{}'",
            name, field
        )));
    }
    u64::from_str_radix(field, 16)
        .map_err(|e| Error::MalformedMetadata(format!("invalid {}: {}", name, e)))
}

/// Digest and length of every accessible member, measured from its start
///
/// Read positions are restored afterwards. Inaccessible members yield `None`.
pub(crate) fn measure_members<R: Read + Seek>(
    members: &mut [Option<R>; MEMBER_COUNT],
) -> Result<[Option<(Digest, u64)>; MEMBER_COUNT]> {
    let mut measured = [None; MEMBER_COUNT];
    for member in Member::ALL {
        let Some(stream) = members[member.index()].as_mut() else {
            continue;
        };
        let read_err = |source| Error::MemberRead { member, source };

        let position = stream.stream_position().map_err(read_err)?;
        stream.seek(SeekFrom::Start(0)).map_err(read_err)?;
        let digest = StreamDigest::of_reader(&mut *stream).map_err(read_err)?;
        stream.seek(SeekFrom::Start(position)).map_err(read_err)?;

        measured[member.index()] = Some(digest);
    }
    Ok(measured)
}

impl fmt::Display for MetadataRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Version: {:02x}", self.version)?;
        writeln!(f, "Missing: {}", self.missing)?;
        for member in Member::ALL {
            writeln!(f, "{}: {}", member.index(), self.member_digest(member))?;
        }
        write!(f, "I: {}", self.original)
    }
}

/// Bitmask of record fields that differ between two records
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MetadataDiff(u8);

impl MetadataDiff {
    pub const NONE: MetadataDiff = MetadataDiff(0x00);
    pub const MEMBER0: MetadataDiff = MetadataDiff(0x01);
    pub const MEMBER1: MetadataDiff = MetadataDiff(0x02);
    pub const MEMBER2: MetadataDiff = MetadataDiff(0x04);
    pub const ORIGINAL: MetadataDiff = MetadataDiff(0x08);
    pub const VERSION: MetadataDiff = MetadataDiff(0x10);
    pub const MISSING: MetadataDiff = MetadataDiff(0x20);

    const NAMES: [(MetadataDiff, &'static str); 6] = [
        (MetadataDiff::MEMBER0, "member0"),
        (MetadataDiff::MEMBER1, "member1"),
        (MetadataDiff::MEMBER2, "member2"),
        (MetadataDiff::ORIGINAL, "original"),
        (MetadataDiff::VERSION, "version"),
        (MetadataDiff::MISSING, "missing"),
    ];

    /// Flag for a member's digest
    pub fn member(member: Member) -> MetadataDiff {
        MetadataDiff(1 << member.index())
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: MetadataDiff) -> bool {
        self.0 & other.0 == other.0
    }

    /// Members whose digests differ
    pub fn differing_members(self) -> Vec<Member> {
        Member::ALL
            .into_iter()
            .filter(|m| self.contains(MetadataDiff::member(*m)))
            .collect()
    }
}

impl BitOr for MetadataDiff {
    type Output = MetadataDiff;

    fn bitor(self, rhs: MetadataDiff) -> MetadataDiff {
        MetadataDiff(self.0 | rhs.0)
    }
}

impl fmt::Display for MetadataDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&names.join(", "))
    }
}

impl fmt::Debug for MetadataDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MetadataDiff({:#04x}: {})", self.0, self)
    }
}

/// Determine which member, if any, must be excluded from reconstruction
///
/// Returns `Ok(None)` when every member digest matches, `Ok(Some(member))`
/// when exactly one differs. Two or more differing members, or a version
/// mismatch, cannot be recovered from.
pub fn infer_failed_member(
    persisted: &MetadataRecord,
    recomputed: &MetadataRecord,
) -> Result<Option<Member>> {
    if persisted.version != METADATA_VERSION {
        return Err(Error::UnsupportedMetadataVersion {
            expected: METADATA_VERSION,
            got: persisted.version,
        });
    }

    let diff = persisted.diff(recomputed);
    if diff.contains(MetadataDiff::VERSION) {
        return Err(Error::MetadataMismatch(diff));
    }

    match diff.differing_members().as_slice() {
        [] => Ok(None),
        [failed] => Ok(Some(*failed)),
        _ => Err(Error::MetadataMismatch(diff)),
    }
}
