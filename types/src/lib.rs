//! Fundamental types for the Tandem governance core.
//!
//! This crate defines the data model shared across every other crate in the
//! workspace: chains, amounts, timestamps, proposals and their status machine,
//! votes, UTXOs, balance snapshots, treasury flows, allocations, and the
//! error taxonomy.

pub mod address;
pub mod allocation;
pub mod amount;
pub mod balance;
pub mod chain;
pub mod error;
pub mod execution;
pub mod flow;
pub mod hash;
pub mod proposal;
pub mod status;
pub mod time;
pub mod utxo;
pub mod vote;

pub use address::{AddressError, EvmAddress};
pub use allocation::Allocation;
pub use amount::Amount;
pub use balance::BalanceSnapshot;
pub use chain::Chain;
pub use error::{ErrorKind, ValidationError};
pub use execution::ExecutionResult;
pub use flow::{FlowDirection, TreasuryFlow};
pub use hash::{AssetId, TxHash, TxRef};
pub use proposal::{
    ContractAction, Proposal, ProposalBody, ProposalId, ProposalKind, UtxoAction,
};
pub use status::{ProposalStatus, StatusEvent};
pub use time::Timestamp;
pub use utxo::{AssetHolding, ScriptType, Utxo};
pub use vote::{Ballot, ChainPosition, Vote, VoteWindow, VoteWitness};
