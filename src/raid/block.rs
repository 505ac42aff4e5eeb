//! Block-level striping codec
//!
//! One round turns up to two blocks of input into a stripe triple:
//! primary (first block), secondary (the rest) and parity (their XOR).
//! Bytes of primary without a secondary counterpart are paired with an
//! implicit all-ones secondary, so their parity is the complement of primary.
//! Decoding reverses this with any single member absent.

use crate::error::{BufferKind, Error, Result};
use crate::raid::member::{Member, ParitySlot, Role};

/// Default striping unit in bytes
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// Largest supported striping unit (the missing count is stored in 4 hex digits)
pub const MAX_BLOCK_SIZE: usize = 0xFFFF;

/// Segments produced by one encoding round
///
/// `parity.len() == primary.len()` and `secondary.len() <= primary.len()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StripeTriple {
    primary: Vec<u8>,
    secondary: Vec<u8>,
    parity: Vec<u8>,
}

impl StripeTriple {
    /// Create a triple with room for one block per segment
    pub fn with_block_size(block_size: usize) -> Result<Self> {
        let mut triple = StripeTriple::default();
        for segment in [&mut triple.primary, &mut triple.secondary, &mut triple.parity] {
            segment
                .try_reserve_exact(block_size)
                .map_err(|_| Error::Allocation(BufferKind::Member))?;
        }
        Ok(triple)
    }

    pub fn primary(&self) -> &[u8] {
        &self.primary
    }

    pub fn secondary(&self) -> &[u8] {
        &self.secondary
    }

    pub fn parity(&self) -> &[u8] {
        &self.parity
    }

    /// Segment written for the given role
    pub fn segment(&self, role: Role) -> &[u8] {
        match role {
            Role::Primary => &self.primary,
            Role::Secondary => &self.secondary,
            Role::Parity => &self.parity,
        }
    }

    fn clear(&mut self) {
        self.primary.clear();
        self.secondary.clear();
        self.parity.clear();
    }
}

/// Role-ordered bytes read from the members for one decoding round
///
/// An unavailable member contributes an empty slice.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundSegments<'a> {
    pub primary: &'a [u8],
    pub secondary: &'a [u8],
    pub parity: &'a [u8],
}

/// Stateless encode/decode pair for a fixed block size
#[derive(Debug, Clone, Copy)]
pub struct BlockCodec {
    block_size: usize,
}

impl BlockCodec {
    /// Create a codec for the given block size
    pub fn new(block_size: usize) -> Result<Self> {
        if block_size == 0 || block_size > MAX_BLOCK_SIZE {
            return Err(Error::InvalidConfig(format!(
                "block size must be within 1..={}, got {}",
                MAX_BLOCK_SIZE, block_size
            )));
        }
        Ok(Self { block_size })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Input bytes consumed by one full round
    pub fn round_size(&self) -> usize {
        2 * self.block_size
    }

    /// Encode one round of input into a fresh stripe triple
    pub fn encode(&self, input: &[u8]) -> Result<StripeTriple> {
        let mut stripe = StripeTriple::with_block_size(self.block_size)?;
        self.encode_into(input, &mut stripe)?;
        Ok(stripe)
    }

    /// Encode one round of input, reusing the buffers of `stripe`
    ///
    /// `input` must hold between 1 and `2 * block_size` bytes.
    pub fn encode_into(&self, input: &[u8], stripe: &mut StripeTriple) -> Result<()> {
        if input.is_empty() || input.len() > self.round_size() {
            return Err(Error::InvalidBlock(format!(
                "round input must be 1..={} bytes, got {}",
                self.round_size(),
                input.len()
            )));
        }

        stripe.clear();
        let split = input.len().min(self.block_size);
        let (primary, secondary) = input.split_at(split);

        stripe.primary.extend_from_slice(primary);
        stripe.secondary.extend_from_slice(secondary);
        stripe.parity.extend(
            primary
                .iter()
                .zip(secondary.iter().copied().chain(std::iter::repeat(0xFF)))
                .map(|(p, s)| p ^ s),
        );
        Ok(())
    }

    /// Reconstruct the input of one round
    ///
    /// `failed` is the member whose bytes are not used. `missing` is the
    /// number of bytes the secondary falls short of primary; it is only
    /// non-zero for the terminal round. The reconstructed bytes are appended
    /// to `out`.
    pub fn decode_into(
        &self,
        segments: RoundSegments<'_>,
        slot: ParitySlot,
        failed: Member,
        missing: usize,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        let RoundSegments {
            primary,
            secondary,
            parity,
        } = segments;

        if [primary, secondary, parity]
            .iter()
            .any(|segment| segment.len() > self.block_size)
        {
            return Err(Error::Reconstruction(format!(
                "segment exceeds block size {}",
                self.block_size
            )));
        }

        out.try_reserve(self.round_size())
            .map_err(|_| Error::Allocation(BufferKind::Input))?;

        match slot.role_of(failed) {
            Role::Parity => {
                out.extend_from_slice(primary);
                out.extend_from_slice(secondary);
            }
            Role::Secondary => {
                let len = primary.len().checked_sub(missing).ok_or_else(|| {
                    Error::Reconstruction(format!(
                        "missing count {} exceeds primary length {}",
                        missing,
                        primary.len()
                    ))
                })?;
                if parity.len() < len {
                    return Err(Error::Reconstruction(format!(
                        "parity on {} holds {} bytes, need {}",
                        slot.parity(),
                        parity.len(),
                        len
                    )));
                }
                out.extend_from_slice(primary);
                out.extend(primary[..len].iter().zip(&parity[..len]).map(|(p, q)| p ^ q));
            }
            Role::Primary => {
                if parity.len() < secondary.len() {
                    return Err(Error::Reconstruction(format!(
                        "parity on {} holds {} bytes, secondary holds {}",
                        slot.parity(),
                        parity.len(),
                        secondary.len()
                    )));
                }
                let (paired, tail) = parity.split_at(secondary.len());
                out.extend(secondary.iter().zip(paired).map(|(s, q)| s ^ q));
                out.extend(tail.iter().map(|q| !q));
                out.extend_from_slice(secondary);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> BlockCodec {
        BlockCodec::new(4).unwrap()
    }

    #[test]
    fn test_codec_creation() {
        assert!(BlockCodec::new(1).is_ok());
        assert!(BlockCodec::new(MAX_BLOCK_SIZE).is_ok());
        assert!(BlockCodec::new(0).is_err());
        assert!(BlockCodec::new(MAX_BLOCK_SIZE + 1).is_err());
    }

    #[test]
    fn test_encode_full_round() {
        let stripe = codec().encode(&[0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48]).unwrap();
        assert_eq!(stripe.primary(), &[0x41, 0x42, 0x43, 0x44]);
        assert_eq!(stripe.secondary(), &[0x45, 0x46, 0x47, 0x48]);
        assert_eq!(stripe.parity(), &[0x41 ^ 0x45, 0x42 ^ 0x46, 0x43 ^ 0x47, 0x44 ^ 0x48]);
    }

    #[test]
    fn test_encode_short_round_complements() {
        let stripe = codec().encode(&[0x49, 0x4A]).unwrap();
        assert_eq!(stripe.primary(), &[0x49, 0x4A]);
        assert!(stripe.secondary().is_empty());
        assert_eq!(stripe.parity(), &[!0x49u8, !0x4Au8]);
    }

    #[test]
    fn test_encode_partial_secondary() {
        let stripe = codec().encode(&[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(stripe.primary(), &[1, 2, 3, 4]);
        assert_eq!(stripe.secondary(), &[5, 6]);
        assert_eq!(stripe.parity(), &[1 ^ 5, 2 ^ 6, !3u8, !4u8]);
        assert_eq!(stripe.parity().len(), stripe.primary().len());
    }

    #[test]
    fn test_encode_rejects_bad_lengths() {
        assert!(codec().encode(&[]).is_err());
        assert!(codec().encode(&[0u8; 9]).is_err());
    }

    fn decode_with(stripe: &StripeTriple, failed: Role, missing: usize) -> Vec<u8> {
        let slot = ParitySlot::INITIAL;
        let pick = |role: Role| {
            if role == failed {
                &[][..]
            } else {
                stripe.segment(role)
            }
        };
        let segments = RoundSegments {
            primary: pick(Role::Primary),
            secondary: pick(Role::Secondary),
            parity: pick(Role::Parity),
        };
        let mut out = Vec::new();
        codec()
            .decode_into(segments, slot, slot.member_for(failed), missing, &mut out)
            .unwrap();
        out
    }

    #[test]
    fn test_decode_each_failed_role() {
        let input = [9u8, 8, 7, 6, 5, 4, 3, 2];
        let stripe = codec().encode(&input).unwrap();
        for role in [Role::Primary, Role::Secondary, Role::Parity] {
            assert_eq!(decode_with(&stripe, role, 0), input, "failed role {:?}", role);
        }
    }

    #[test]
    fn test_decode_partial_round_with_missing() {
        let input = [1u8, 2, 3, 4, 5];
        let stripe = codec().encode(&input).unwrap();
        // secondary is 3 bytes short of primary
        assert_eq!(decode_with(&stripe, Role::Secondary, 3), input);
        assert_eq!(decode_with(&stripe, Role::Primary, 3), input);
        assert_eq!(decode_with(&stripe, Role::Parity, 3), input);
    }

    #[test]
    fn test_decode_short_round_without_secondary() {
        let input = [0x49u8, 0x4A];
        let stripe = codec().encode(&input).unwrap();
        assert_eq!(decode_with(&stripe, Role::Secondary, 2), input);
        assert_eq!(decode_with(&stripe, Role::Primary, 2), input);
    }

    #[test]
    fn test_decode_rejects_excess_missing() {
        let slot = ParitySlot::INITIAL;
        let segments = RoundSegments {
            primary: &[1, 2],
            secondary: &[],
            parity: &[0xFE, 0xFD],
        };
        let mut out = Vec::new();
        let result = codec().decode_into(segments, slot, slot.secondary(), 3, &mut out);
        assert!(matches!(result, Err(Error::Reconstruction(_))));
    }

    #[test]
    fn test_decode_rejects_short_parity() {
        let slot = ParitySlot::INITIAL;
        let segments = RoundSegments {
            primary: &[],
            secondary: &[1, 2, 3],
            parity: &[1],
        };
        let mut out = Vec::new();
        let result = codec().decode_into(segments, slot, slot.primary(), 0, &mut out);
        assert!(matches!(result, Err(Error::Reconstruction(_))));
    }

    #[test]
    fn test_decode_rejects_oversized_segment() {
        let slot = ParitySlot::INITIAL;
        let segments = RoundSegments {
            primary: &[0; 5],
            secondary: &[],
            parity: &[],
        };
        let mut out = Vec::new();
        let result = codec().decode_into(segments, slot, slot.parity(), 0, &mut out);
        assert!(result.is_err());
    }
}
