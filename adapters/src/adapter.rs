//! The capability surface every chain adapter offers.

use crate::error::ChainError;
use async_trait::async_trait;
use bitcoin::ScriptBuf;
use futures_util::stream::BoxStream;
use tandem_types::{
    Amount, Ballot, BalanceSnapshot, Chain, Proposal, ProposalId, ProposalKind, Timestamp,
    TreasuryFlow, TxRef, Utxo, Vote, VoteWindow,
};

/// Lazy, finite, single-pass sequence of proposals. The stream ends after
/// yielding its first error.
pub type ProposalStream<'a> = BoxStream<'a, Result<Proposal, ChainError>>;

/// Which committed proposals to return.
///
/// `start`/`end` bound the scan cursor: block height on the UTXO chain,
/// contract-assigned proposal id on the contract chain. Both are inclusive.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProposalFilter {
    pub start: Option<u64>,
    pub end: Option<u64>,
    pub proposer: Option<String>,
    pub kind: Option<ProposalKind>,
}

impl ProposalFilter {
    pub fn matches(&self, proposal: &Proposal) -> bool {
        self.proposer
            .as_deref()
            .map_or(true, |p| p.eq_ignore_ascii_case(&proposal.proposer()))
            && self.kind.map_or(true, |k| k == proposal.kind())
    }
}

/// Votes committed inside a voting window.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VoteSet {
    /// In canonical chain order.
    pub votes: Vec<Vote>,
    /// Last block stamped before the window closes, when one was scanned.
    pub cutoff: Option<u64>,
    /// A block stamped at or after the close exists, so the set is final.
    pub settled: bool,
}

/// A signed transaction ready for broadcast.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignedTx {
    Utxo(bitcoin::Transaction),
    /// RLP-encoded signed contract-chain transaction.
    Contract(Vec<u8>),
}

impl SignedTx {
    pub fn chain(&self) -> Chain {
        match self {
            SignedTx::Utxo(_) => Chain::Utxo,
            SignedTx::Contract(_) => Chain::Contract,
        }
    }
}

/// Uniform access to one chain.
///
/// Adapters never retry on their own; callers apply backoff to retryable
/// errors.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain(&self) -> Chain;

    /// Where the treasury holds funds on this chain.
    fn treasury_address(&self) -> &str;

    /// Commit an encoded proposal on-chain.
    async fn submit_proposal(&self, encoded: &[u8]) -> Result<TxRef, ChainError>;

    fn fetch_proposals(&self, filter: ProposalFilter) -> ProposalStream<'_>;

    async fn cast_vote(&self, proposal_id: &ProposalId, ballot: &Ballot)
        -> Result<TxRef, ChainError>;

    /// Committed votes on `proposal` whose block time falls inside `window`.
    async fn fetch_votes(
        &self,
        proposal: &Proposal,
        window: &VoteWindow,
    ) -> Result<VoteSet, ChainError>;

    async fn get_balance(&self, address: &str) -> Result<BalanceSnapshot, ChainError>;

    async fn broadcast(&self, signed: &SignedTx) -> Result<TxRef, ChainError>;

    /// Membership gate: balance of the configured membership asset is at
    /// least `minimum`.
    async fn is_member(&self, address: &str, minimum: Amount) -> Result<bool, ChainError>;

    /// [`Self::is_member`] against the balance at block `height`. Adapters
    /// without [`Self::historical_membership`] read the latest balance.
    async fn is_member_at(
        &self,
        address: &str,
        minimum: Amount,
        _height: Option<u64>,
    ) -> Result<bool, ChainError> {
        self.is_member(address, minimum).await
    }

    /// Whether [`Self::is_member_at`] honours its height.
    fn historical_membership(&self) -> bool {
        false
    }

    /// Treasury income and expenses in blocks stamped within `[from, to)`,
    /// in chain order.
    async fn treasury_flows(
        &self,
        _from: Timestamp,
        _to: Timestamp,
    ) -> Result<Vec<TreasuryFlow>, ChainError> {
        Err(ChainError::Unsupported {
            chain: self.chain(),
            operation: "treasury_flows",
        })
    }

    /// Spendable outputs of `address`, asset commitments included when their
    /// leaf is known.
    async fn list_unspent(&self, _address: &str) -> Result<Vec<Utxo>, ChainError> {
        Err(ChainError::Unsupported {
            chain: self.chain(),
            operation: "list_unspent",
        })
    }

    /// Call `execute(id)` on the DAO contract.
    async fn execute_contract(&self, _proposal_id: u64) -> Result<TxRef, ChainError> {
        Err(ChainError::Unsupported {
            chain: self.chain(),
            operation: "execute_contract",
        })
    }

    /// Remember asset-commitment leaves created by a transaction so their
    /// outputs become spendable.
    fn register_commitments(&self, _leaves: &[ScriptBuf]) -> Result<(), ChainError> {
        Ok(())
    }

    /// Payloads discarded by `fetch_proposals`/`fetch_votes` because they
    /// failed to decode.
    fn skipped_payloads(&self) -> u64;
}
