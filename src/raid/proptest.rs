//! Property-based tests for striping
//!
//! # Test Properties
//!
//! 1. **Roundtrip**: split then merge with every member intact returns the input
//! 2. **Single-failure tolerance**: any one member lost or corrupted still
//!    reconstructs the input
//! 3. **Double-failure rejection**: two lost members never produce output
//! 4. **Determinism**: same input and key give byte-identical members and record
//! 5. **Layout**: members are balanced and parity rotates

#![cfg(test)]

use proptest::prelude::*;
use std::io::Cursor;

use super::block::BlockCodec;
use super::member::{Member, ParitySlot, Role, MEMBER_COUNT};
use super::metadata::MetadataRecord;
use super::pipeline::Pipeline;
use crate::crypto::CipherKey;
use crate::error::Error;

// =============================================================================
// Strategies and helpers
// =============================================================================

fn block_size_strategy() -> impl Strategy<Value = usize> {
    prop_oneof![1usize..=8, Just(16usize), Just(64usize), Just(1024usize)]
}

fn data_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..3000)
}

fn key_strategy() -> impl Strategy<Value = Option<Vec<u8>>> {
    prop::option::of(prop::collection::vec(any::<u8>(), 1..32))
}

struct Split {
    members: [Vec<u8>; MEMBER_COUNT],
    record: MetadataRecord,
}

fn split(block_size: usize, data: &[u8], key: Option<&CipherKey>) -> Result<Split, Error> {
    let pipeline = Pipeline::new(block_size)?;
    let mut members: [Vec<u8>; MEMBER_COUNT] = Default::default();
    let mut persisted = Vec::new();
    let written = pipeline.split(data, &mut members, &mut persisted, key)?;
    let record = MetadataRecord::read_from(&persisted[..])?;
    assert_eq!(written, record);
    Ok(Split { members, record })
}

fn merge(
    block_size: usize,
    split: &Split,
    members: [Option<Vec<u8>>; MEMBER_COUNT],
    key: Option<&CipherKey>,
) -> Result<Vec<u8>, Error> {
    let pipeline = Pipeline::new(block_size)?;
    let streams = members.map(|m| m.map(Cursor::new));
    let mut out = Vec::new();
    pipeline.merge(streams, &split.record, key, &mut out)?;
    Ok(out)
}

fn all_members(split: &Split) -> [Option<Vec<u8>>; MEMBER_COUNT] {
    std::array::from_fn(|i| Some(split.members[i].clone()))
}

// =============================================================================
// Roundtrip and fault tolerance
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: split then merge with all members returns the input.
    #[test]
    fn prop_roundtrip_no_loss(
        block_size in block_size_strategy(),
        data in data_strategy(),
        key in key_strategy(),
    ) {
        let key = key.as_deref().and_then(CipherKey::from_passphrase);
        let split = split(block_size, &data, key.as_ref())?;
        let recovered = merge(block_size, &split, all_members(&split), key.as_ref())?;
        prop_assert_eq!(recovered, data);
    }

    /// Property: any single absent member is reconstructed.
    #[test]
    fn prop_single_member_absent(
        block_size in block_size_strategy(),
        data in data_strategy(),
        lost in 0usize..MEMBER_COUNT,
    ) {
        let split = split(block_size, &data, None)?;
        let mut members = all_members(&split);
        members[lost] = None;

        let recovered = merge(block_size, &split, members, None)?;
        prop_assert_eq!(recovered, data, "lost member{}", lost);
    }

    /// Property: a corrupted member is excluded and reconstructed.
    #[test]
    fn prop_single_member_corrupted(
        block_size in block_size_strategy(),
        data in prop::collection::vec(any::<u8>(), 1..3000),
        corrupt in 0usize..MEMBER_COUNT,
        offset in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let split = split(block_size, &data, None)?;
        let mut members = all_members(&split);
        let bytes = members[corrupt].as_mut().unwrap();
        prop_assume!(!bytes.is_empty());
        let at = offset.index(bytes.len());
        bytes[at] ^= flip;

        let recovered = merge(block_size, &split, members, None)?;
        prop_assert_eq!(recovered, data);
    }

    /// Property: two absent members are always rejected.
    #[test]
    fn prop_double_loss_rejected(
        block_size in block_size_strategy(),
        data in prop::collection::vec(any::<u8>(), 1..2000),
        kept in 0usize..MEMBER_COUNT,
    ) {
        let split = split(block_size, &data, None)?;
        let mut members: [Option<Vec<u8>>; MEMBER_COUNT] = Default::default();
        members[kept] = Some(split.members[kept].clone());

        let result = merge(block_size, &split, members, None);
        prop_assert!(matches!(result, Err(Error::MetadataMismatch(_))));
    }
}

// =============================================================================
// Layout properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: same input and key give identical members and record.
    #[test]
    fn prop_deterministic(
        block_size in block_size_strategy(),
        data in data_strategy(),
        key in key_strategy(),
    ) {
        let key = key.as_deref().and_then(CipherKey::from_passphrase);
        let a = split(block_size, &data, key.as_ref())?;
        let b = split(block_size, &data, key.as_ref())?;
        prop_assert_eq!(&a.members, &b.members);
        prop_assert_eq!(a.record, b.record);
    }

    /// Property: member lengths add up to input plus parity, and the spread
    /// between members never exceeds one block.
    #[test]
    fn prop_member_lengths(
        block_size in block_size_strategy(),
        data in data_strategy(),
    ) {
        let split = split(block_size, &data, None)?;
        let lens: Vec<usize> = split.members.iter().map(Vec::len).collect();
        let longest = *lens.iter().max().unwrap();
        let shortest = *lens.iter().min().unwrap();

        prop_assert!(longest - shortest <= block_size);
        prop_assert_eq!(split.record.missing, (longest - shortest) as u64);

        let parity_bytes: usize = data
            .chunks(2 * block_size)
            .map(|round| round.len().min(block_size))
            .sum();
        prop_assert_eq!(lens.iter().sum::<usize>(), data.len() + parity_bytes);
    }

    /// Property: every round's parity is primary XOR secondary, with the
    /// unpaired tail of primary complemented.
    #[test]
    fn prop_parity_relation(
        block_size in 1usize..=32,
        round in prop::collection::vec(any::<u8>(), 1..=64),
    ) {
        let codec = BlockCodec::new(block_size)?;
        prop_assume!(round.len() <= codec.round_size());
        let stripe = codec.encode(&round)?;

        prop_assert_eq!(stripe.parity().len(), stripe.primary().len());
        prop_assert!(stripe.secondary().len() <= stripe.primary().len());
        for (i, (&p, &q)) in stripe.primary().iter().zip(stripe.parity()).enumerate() {
            let s = stripe.secondary().get(i).copied().unwrap_or(0xFF);
            prop_assert_eq!(q, p ^ s);
        }
    }

    /// Property: member digests in the record match the members written.
    #[test]
    fn prop_record_digests(
        block_size in block_size_strategy(),
        data in data_strategy(),
    ) {
        let split = split(block_size, &data, None)?;
        let mut streams: [Option<Cursor<Vec<u8>>>; MEMBER_COUNT] =
            std::array::from_fn(|i| Some(Cursor::new(split.members[i].clone())));
        let recomputed = MetadataRecord::recompute(&mut streams)?;
        prop_assert_eq!(recomputed.members, split.record.members);
    }
}

#[test]
fn test_parity_rotation_over_rounds() {
    let block_size = 2;
    let data: Vec<u8> = (0..(2 * block_size * 6) as u8).collect();
    let split = split(block_size, &data, None).unwrap();

    let mut slot = ParitySlot::INITIAL;
    let mut offsets = [0usize; MEMBER_COUNT];
    for round in data.chunks(2 * block_size) {
        for role in [Role::Primary, Role::Secondary, Role::Parity] {
            let member = slot.member_for(role);
            let at = offsets[member.index()];
            let segment = &split.members[member.index()][at..at + block_size];
            match role {
                Role::Primary => assert_eq!(segment, &round[..block_size]),
                Role::Secondary => assert_eq!(segment, &round[block_size..]),
                Role::Parity => {
                    assert_eq!(segment[0], round[0] ^ round[block_size]);
                }
            }
            offsets[member.index()] += block_size;
        }
        slot = slot.advance();
    }
    for member in Member::ALL {
        assert_eq!(offsets[member.index()], split.members[member.index()].len());
    }
    assert_eq!(split.record.missing, 0);
}
