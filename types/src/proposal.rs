//! Governance proposals as a tagged union keyed by chain.
//!
//! Each variant carries only the fields valid on its chain: UTXO proposals
//! are content-addressed and may move assets; contract proposals get their id
//! from the DAO contract and name 20-byte accounts.

use crate::address::EvmAddress;
use crate::amount::Amount;
use crate::chain::Chain;
use crate::error::ValidationError;
use crate::hash::{decode_32, AssetId};
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Identity of a committed proposal.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProposalId {
    /// Content address of a UTXO-chain proposal: SHA-256 of its id-less encoding.
    Content([u8; 32]),
    /// Integer id assigned by the DAO contract.
    Contract(u64),
}

impl ProposalId {
    pub fn chain(&self) -> Chain {
        match self {
            ProposalId::Content(_) => Chain::Utxo,
            ProposalId::Contract(_) => Chain::Contract,
        }
    }

    /// Raw id bytes as they appear in the payload id field.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            ProposalId::Content(bytes) => bytes.to_vec(),
            ProposalId::Contract(n) => n.to_be_bytes().to_vec(),
        }
    }
}

impl fmt::Debug for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProposalId({})", self)
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProposalId::Content(bytes) => write!(f, "utxo:{}", hex::encode(bytes)),
            ProposalId::Contract(n) => write!(f, "contract:{}", n),
        }
    }
}

impl FromStr for ProposalId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(h) = s.strip_prefix("utxo:") {
            return decode_32(h).map(ProposalId::Content);
        }
        if let Some(n) = s.strip_prefix("contract:") {
            return n
                .parse::<u64>()
                .map(ProposalId::Contract)
                .map_err(|e| format!("invalid contract proposal id: {e}"));
        }
        Err(format!("proposal id must start with utxo: or contract: ({s})"))
    }
}

/// The chain-independent content of a proposal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalBody {
    pub title: String,
    pub description: String,
    /// Ordered voting options. The first option is the affirmative one.
    pub options: Vec<String>,
    pub start_time: Timestamp,
    pub end_time: Option<Timestamp>,
}

impl ProposalBody {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if self.options.len() < 2 {
            return Err(ValidationError::TooFewOptions(self.options.len()));
        }
        if self.options.len() > u8::MAX as usize {
            return Err(ValidationError::TooManyOptions(self.options.len()));
        }
        let mut seen = HashSet::new();
        for option in &self.options {
            if option.is_empty() {
                return Err(ValidationError::EmptyOption);
            }
            if !seen.insert(option.as_str()) {
                return Err(ValidationError::DuplicateOption(option.clone()));
            }
        }
        if let Some(end) = self.end_time {
            if end <= self.start_time {
                return Err(ValidationError::EndBeforeStart {
                    start: self.start_time.as_secs(),
                    end: end.as_secs(),
                });
            }
        }
        Ok(())
    }

    /// Position of `option` in the ordered option list.
    pub fn option_index(&self, option: &str) -> Option<u8> {
        self.options
            .iter()
            .position(|o| o == option)
            .and_then(|i| u8::try_from(i).ok())
    }

    /// Whether the voting window contains `now`.
    pub fn is_open_at(&self, now: Timestamp) -> bool {
        now >= self.start_time && self.end_time.map_or(true, |end| now < end)
    }

    /// Whether the voting window has closed at `now`.
    pub fn has_ended_at(&self, now: Timestamp) -> bool {
        self.end_time.is_some_and(|end| now >= end)
    }
}

/// Payload kind, stored in the low nibble of the tag byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProposalKind {
    Signal,
    Spend,
    AssetTransfer,
}

impl ProposalKind {
    pub fn nibble(&self) -> u8 {
        match self {
            ProposalKind::Signal => 0x0,
            ProposalKind::Spend => 0x1,
            ProposalKind::AssetTransfer => 0x2,
        }
    }

    pub fn from_nibble(nibble: u8) -> Option<Self> {
        match nibble {
            0x0 => Some(ProposalKind::Signal),
            0x1 => Some(ProposalKind::Spend),
            0x2 => Some(ProposalKind::AssetTransfer),
            _ => None,
        }
    }
}

/// What executing a UTXO-chain proposal does.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UtxoAction {
    Signal,
    /// Pay native value from the treasury to an address.
    Spend { recipient: String, amount: Amount },
    /// Move asset units from the treasury into a commitment owned by an x-only key.
    AssetTransfer {
        recipient_key: [u8; 32],
        asset_id: AssetId,
        amount: Amount,
    },
}

/// What executing a contract-chain proposal does.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractAction {
    Signal,
    /// Pay native value from the DAO contract to an account.
    Spend { recipient: EvmAddress, amount: Amount },
}

/// A governance proposal.
///
/// Everything here is immutable once broadcast; status is tracked separately
/// as an append-only sequence of [`crate::StatusEvent`]s.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Proposal {
    Utxo {
        id: [u8; 32],
        proposer: String,
        body: ProposalBody,
        action: UtxoAction,
    },
    Contract {
        /// `None` until the DAO contract assigns an id.
        id: Option<u64>,
        proposer: EvmAddress,
        body: ProposalBody,
        action: ContractAction,
    },
}

impl Proposal {
    pub fn chain(&self) -> Chain {
        match self {
            Proposal::Utxo { .. } => Chain::Utxo,
            Proposal::Contract { .. } => Chain::Contract,
        }
    }

    /// The committed id, or `None` for a contract draft.
    pub fn id(&self) -> Option<ProposalId> {
        match self {
            Proposal::Utxo { id, .. } => Some(ProposalId::Content(*id)),
            Proposal::Contract { id, .. } => id.map(ProposalId::Contract),
        }
    }

    pub fn body(&self) -> &ProposalBody {
        match self {
            Proposal::Utxo { body, .. } | Proposal::Contract { body, .. } => body,
        }
    }

    /// Proposer address rendered in its chain's native format.
    pub fn proposer(&self) -> String {
        match self {
            Proposal::Utxo { proposer, .. } => proposer.clone(),
            Proposal::Contract { proposer, .. } => proposer.to_string(),
        }
    }

    pub fn kind(&self) -> ProposalKind {
        match self {
            Proposal::Utxo { action, .. } => match action {
                UtxoAction::Signal => ProposalKind::Signal,
                UtxoAction::Spend { .. } => ProposalKind::Spend,
                UtxoAction::AssetTransfer { .. } => ProposalKind::AssetTransfer,
            },
            Proposal::Contract { action, .. } => match action {
                ContractAction::Signal => ProposalKind::Signal,
                ContractAction::Spend { .. } => ProposalKind::Spend,
            },
        }
    }

    /// Attach the id assigned by the DAO contract. No-op for UTXO proposals.
    pub fn with_contract_id(mut self, assigned: u64) -> Self {
        if let Proposal::Contract { id, .. } = &mut self {
            *id = Some(assigned);
        }
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.body().validate()?;
        match self {
            Proposal::Utxo {
                proposer, action, ..
            } => {
                if proposer.is_empty() {
                    return Err(ValidationError::Other("proposer must not be empty".into()));
                }
                match action {
                    UtxoAction::Signal => {}
                    UtxoAction::Spend { recipient, amount } => {
                        if recipient.is_empty() {
                            return Err(ValidationError::EmptyRecipient);
                        }
                        if amount.is_zero() {
                            return Err(ValidationError::ZeroAmount);
                        }
                    }
                    UtxoAction::AssetTransfer { amount, .. } => {
                        if amount.is_zero() {
                            return Err(ValidationError::ZeroAmount);
                        }
                    }
                }
            }
            Proposal::Contract { action, .. } => {
                if let ContractAction::Spend { amount, .. } = action {
                    if amount.is_zero() {
                        return Err(ValidationError::ZeroAmount);
                    }
                }
            }
        }
        Ok(())
    }
}
