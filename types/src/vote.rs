//! Ballots (uncommitted votes) and committed votes with their chain position.

use crate::amount::Amount;
use crate::hash::TxHash;
use crate::proposal::ProposalId;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};

/// Canonical position of a transaction: block height, then index within the block.
///
/// Ordering on this type is the chain's canonical order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChainPosition {
    pub height: u64,
    pub tx_index: u32,
}

impl ChainPosition {
    pub fn new(height: u64, tx_index: u32) -> Self {
        Self { height, tx_index }
    }
}

/// The transaction that committed a vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoteWitness {
    pub tx: TxHash,
    pub position: ChainPosition,
}

/// A vote the caller wants to cast; becomes a [`Vote`] once committed on-chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub proposal_id: ProposalId,
    pub voter: String,
    pub option_index: u8,
    pub weight: Amount,
}

/// A committed vote. Immutable; a later vote by the same voter supersedes it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub proposal_id: ProposalId,
    pub voter: String,
    pub option: String,
    pub weight: Amount,
    pub witness: VoteWitness,
}

/// Block-time bounds of a voting period: `opens` inclusive, `closes` exclusive.
///
/// Votes count only when the block that carries them falls inside the window,
/// however they reached the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteWindow {
    pub opens: Timestamp,
    pub closes: Timestamp,
}

impl VoteWindow {
    /// Every block ever mined.
    pub const UNBOUNDED: Self = Self {
        opens: Timestamp::new(0),
        closes: Timestamp::new(u64::MAX),
    };

    pub fn new(opens: Timestamp, closes: Timestamp) -> Self {
        Self { opens, closes }
    }

    pub fn contains(&self, at: Timestamp) -> bool {
        at >= self.opens && at < self.closes
    }
}
