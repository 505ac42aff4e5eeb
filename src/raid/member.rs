//! Member identities and the rotating parity assignment
//!
//! Every round assigns one of three roles to each member. The parity slot
//! advances by one member per round, so parity visits all three members.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of members in a set
pub const MEMBER_COUNT: usize = 3;

/// One of the three physical member streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Member {
    Member0,
    Member1,
    Member2,
}

impl Member {
    /// All members in index order
    pub const ALL: [Member; MEMBER_COUNT] = [Member::Member0, Member::Member1, Member::Member2];

    /// Position of this member (0..3)
    pub fn index(self) -> usize {
        match self {
            Member::Member0 => 0,
            Member::Member1 => 1,
            Member::Member2 => 2,
        }
    }

    /// Member at the given position, if in range
    pub fn from_index(index: usize) -> Option<Member> {
        Member::ALL.get(index).copied()
    }

    fn offset(self, by: usize) -> Member {
        Member::ALL[(self.index() + by) % MEMBER_COUNT]
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "member{}", self.index())
    }
}

/// Role a member plays within a single round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// First half of the round's input
    Primary,
    /// Second half of the round's input (possibly short or empty)
    Secondary,
    /// XOR of primary and secondary
    Parity,
}

/// The member holding parity for the current round
///
/// Primary is the member after the parity slot, secondary the one after that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParitySlot(Member);

impl ParitySlot {
    /// Parity position of the first round of every stream
    pub const INITIAL: ParitySlot = ParitySlot(Member::Member2);

    /// Slot for the next round
    pub fn advance(self) -> Self {
        ParitySlot(self.0.offset(1))
    }

    /// Member holding the primary segment
    pub fn primary(self) -> Member {
        self.0.offset(1)
    }

    /// Member holding the secondary segment
    pub fn secondary(self) -> Member {
        self.0.offset(2)
    }

    /// Member holding parity
    pub fn parity(self) -> Member {
        self.0
    }

    /// Member assigned to `role` this round
    pub fn member_for(self, role: Role) -> Member {
        match role {
            Role::Primary => self.primary(),
            Role::Secondary => self.secondary(),
            Role::Parity => self.parity(),
        }
    }

    /// Role played by `member` this round
    pub fn role_of(self, member: Member) -> Role {
        if member == self.parity() {
            Role::Parity
        } else if member == self.primary() {
            Role::Primary
        } else {
            Role::Secondary
        }
    }

    /// Members in (primary, secondary, parity) order
    pub fn members(self) -> [Member; MEMBER_COUNT] {
        [self.primary(), self.secondary(), self.parity()]
    }
}

impl Default for ParitySlot {
    fn default() -> Self {
        ParitySlot::INITIAL
    }
}
