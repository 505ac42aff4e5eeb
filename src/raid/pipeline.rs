//! Streaming split and merge over three members
//!
//! A split reads the source two blocks at a time, optionally encrypts each
//! chunk, encodes it into a stripe triple and appends the segments to the
//! members chosen by the rotating parity slot. Digests are accumulated per
//! physical member, so each member's digest covers its bytes across all the
//! roles it plays.
//!
//! A merge infers the failed member from the metadata record, then reads one
//! block from each usable member per round. A round is terminal when a usable
//! data member has nothing left after it; only then does the record's missing
//! count apply.

use std::io::{self, BufRead, BufReader, Read, Seek, Write};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::crypto::{CipherKey, Keystream, StreamDigest};
use crate::error::{BufferKind, Error, Result};
use crate::raid::block::{BlockCodec, RoundSegments, StripeTriple};
use crate::raid::member::{Member, ParitySlot, Role, MEMBER_COUNT};
use crate::raid::metadata::{infer_failed_member, MetadataRecord, MAX_MISSING, METADATA_VERSION};

/// Summary of a completed merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    /// Member excluded from reconstruction, if any
    pub failed_member: Option<Member>,
    /// Rounds processed
    pub rounds: u64,
    /// Bytes written to the output
    pub bytes_written: u64,
}

/// Split/merge driver for a fixed block size
#[derive(Debug, Clone, Copy)]
pub struct Pipeline {
    codec: BlockCodec,
}

impl Pipeline {
    /// Create a pipeline with the given block size
    pub fn new(block_size: usize) -> Result<Self> {
        Ok(Self {
            codec: BlockCodec::new(block_size)?,
        })
    }

    /// Create a pipeline from the configured block size
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.raid.block_size)
    }

    pub fn block_size(&self) -> usize {
        self.codec.block_size()
    }

    /// Split `source` into three members and persist the metadata record
    ///
    /// On failure, bytes already written to members stay where they are.
    pub fn split<R, W, M>(
        &self,
        mut source: R,
        members: &mut [W; MEMBER_COUNT],
        metadata: M,
        key: Option<&CipherKey>,
    ) -> Result<MetadataRecord>
    where
        R: Read,
        W: Write,
        M: Write,
    {
        let mut chunk = alloc_buffer(self.codec.round_size(), BufferKind::Input)?;
        let mut stripe = StripeTriple::with_block_size(self.block_size())?;
        let mut keystream = key.map(Keystream::new);

        let mut original = StreamDigest::new();
        let mut digests: [StreamDigest; MEMBER_COUNT] = Default::default();
        let mut slot = ParitySlot::INITIAL;
        let mut rounds = 0u64;

        loop {
            let len = read_full(&mut source, &mut chunk).map_err(Error::SourceRead)?;
            if len == 0 {
                break;
            }
            let data = &mut chunk[..len];

            if let Some(keystream) = keystream.as_mut() {
                keystream.apply(data);
            }
            original.update(data);

            self.codec.encode_into(data, &mut stripe)?;
            for role in [Role::Primary, Role::Secondary, Role::Parity] {
                let segment = stripe.segment(role);
                if segment.is_empty() {
                    continue;
                }
                let member = slot.member_for(role);
                members[member.index()]
                    .write_all(segment)
                    .map_err(|source| Error::MemberWrite { member, source })?;
                digests[member.index()].update(segment);
            }

            slot = slot.advance();
            rounds += 1;
        }

        for member in Member::ALL {
            members[member.index()]
                .flush()
                .map_err(|source| Error::MemberWrite { member, source })?;
        }

        let lengths = digests.iter().map(StreamDigest::len);
        let longest = lengths.clone().max().unwrap_or(0);
        let shortest = lengths.min().unwrap_or(0);

        let record = MetadataRecord {
            version: METADATA_VERSION,
            members: std::array::from_fn(|i| digests[i].finalize()),
            original: original.finalize(),
            missing: longest - shortest,
        };
        record.write_to(metadata)?;

        info!(
            "Split {} bytes in {} rounds (missing {})",
            original.len(),
            rounds,
            record.missing
        );
        Ok(record)
    }

    /// Merge members back into `output`
    ///
    /// Unavailable members are passed as `None`. The failed member is inferred
    /// by rehashing the available members and comparing against `record`.
    pub fn merge<R, W>(
        &self,
        mut members: [Option<R>; MEMBER_COUNT],
        record: &MetadataRecord,
        key: Option<&CipherKey>,
        output: W,
    ) -> Result<MergeReport>
    where
        R: Read + Seek,
        W: Write,
    {
        let recomputed = MetadataRecord::recompute(&mut members)?;
        let failed = infer_failed_member(record, &recomputed)?;
        if let Some(member) = failed {
            warn!("{} is unavailable or corrupted, reconstructing from the others", member);
        }
        self.reconstruct(members, failed, record, key, output)
    }

    /// Merge members with the failed member already known
    ///
    /// Works on non-seekable streams. `failed` may be `None` when every member
    /// is intact; a member passed as `None` is treated as the failed one.
    pub fn reconstruct<R, W>(
        &self,
        members: [Option<R>; MEMBER_COUNT],
        failed: Option<Member>,
        record: &MetadataRecord,
        key: Option<&CipherKey>,
        mut output: W,
    ) -> Result<MergeReport>
    where
        R: Read,
        W: Write,
    {
        if record.missing > MAX_MISSING || record.missing as usize > self.block_size() {
            return Err(Error::MalformedMetadata(format!(
                "missing count {} exceeds block size {}",
                record.missing,
                self.block_size()
            )));
        }
        let terminal_missing = record.missing as usize;

        let mut readers: [Option<MemberReader<R>>; MEMBER_COUNT] = Default::default();
        let mut absent = Vec::new();
        for (member, stream) in Member::ALL.into_iter().zip(members) {
            match stream {
                Some(stream) if Some(member) != failed => {
                    readers[member.index()] =
                        Some(MemberReader::new(member, stream, self.block_size()));
                }
                _ => absent.push(member),
            }
        }
        let failed = match absent.as_slice() {
            [] => None,
            [member] => Some(*member),
            _ => {
                return Err(Error::Reconstruction(format!(
                    "{} of {} members unavailable",
                    absent.len(),
                    MEMBER_COUNT
                )))
            }
        };

        let mut buffers: [Vec<u8>; MEMBER_COUNT] = Default::default();
        for buffer in buffers.iter_mut() {
            *buffer = alloc_buffer(self.block_size(), BufferKind::Member)?;
        }
        let mut out = Vec::new();
        out.try_reserve_exact(self.codec.round_size())
            .map_err(|_| Error::Allocation(BufferKind::Input))?;

        let mut keystream = key.map(Keystream::new);
        let mut produced = StreamDigest::new();
        let mut slot = ParitySlot::INITIAL;
        let mut rounds = 0u64;

        loop {
            let roles = slot.members();
            let mut lens = [0usize; MEMBER_COUNT];
            for (i, member) in roles.iter().enumerate() {
                if let Some(reader) = readers[member.index()].as_mut() {
                    lens[i] = reader.read_block(&mut buffers[i])?;
                }
            }
            if lens.iter().all(|&len| len == 0) {
                break;
            }

            let mut terminal = false;
            for member in [slot.primary(), slot.secondary()] {
                if let Some(reader) = readers[member.index()].as_mut() {
                    if !reader.has_more()? {
                        terminal = true;
                    }
                }
            }
            let missing = if terminal {
                debug!("Terminal round {} (missing {})", rounds, terminal_missing);
                terminal_missing
            } else {
                0
            };

            let segments = RoundSegments {
                primary: &buffers[0][..lens[0]],
                secondary: &buffers[1][..lens[1]],
                parity: &buffers[2][..lens[2]],
            };
            out.clear();
            self.codec.decode_into(
                segments,
                slot,
                failed.unwrap_or(slot.parity()),
                missing,
                &mut out,
            )?;

            produced.update(&out);
            if let Some(keystream) = keystream.as_mut() {
                keystream.apply(&mut out);
            }
            output.write_all(&out).map_err(Error::OutputWrite)?;

            slot = slot.advance();
            rounds += 1;
        }
        output.flush().map_err(Error::OutputWrite)?;

        let digest = produced.finalize();
        if digest != record.original {
            return Err(Error::DigestMismatch {
                expected: record.original.to_hex(),
                got: digest.to_hex(),
            });
        }

        info!("Merged {} bytes in {} rounds", produced.len(), rounds);
        Ok(MergeReport {
            failed_member: failed,
            rounds,
            bytes_written: produced.len(),
        })
    }
}

/// Sequential member input with end-of-stream look-ahead
struct MemberReader<R> {
    member: Member,
    inner: BufReader<R>,
}

impl<R: Read> MemberReader<R> {
    fn new(member: Member, stream: R, block_size: usize) -> Self {
        MemberReader {
            member,
            inner: BufReader::with_capacity(block_size.max(8192), stream),
        }
    }

    /// Read up to one block; returns fewer bytes only at end of stream
    fn read_block(&mut self, buf: &mut [u8]) -> Result<usize> {
        let member = self.member;
        read_full(&mut self.inner, buf).map_err(|source| Error::MemberRead { member, source })
    }

    /// Whether at least one more byte can be read, without consuming it
    fn has_more(&mut self) -> Result<bool> {
        loop {
            match self.inner.fill_buf() {
                Ok(buf) => return Ok(!buf.is_empty()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(Error::MemberRead {
                        member: self.member,
                        source,
                    })
                }
            }
        }
    }
}

fn alloc_buffer(len: usize, kind: BufferKind) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::Allocation(kind))?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Fill `buf` from `reader`, stopping early only at end of stream
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
