//! The DAO treasury across both chains.
//!
//! [`TreasuryManager`] reads treasury balances through the chain adapters,
//! splits totals under an [`AllocationPolicy`], and executes passed
//! proposals: a signed transaction from the treasury key on the UTXO chain,
//! an `execute(id)` call on the contract chain, nothing at all for signals.
//! Execution is claimed through the status board, so a proposal is carried
//! out at most once however many executors race for it, and only members
//! holding the execution threshold may trigger it. Treasury flows read from
//! each chain add up to an income and expense [`FinancialStatement`].

pub mod allocation;
pub mod error;
pub mod manager;
pub mod statement;

pub use allocation::{allocate, AllocationPolicy, CategoryShare, BPS};
pub use error::TreasuryError;
pub use manager::{TreasuryConfig, TreasuryManager, TreasuryReport, UtxoWallet};
pub use statement::{ChainStatement, FinancialStatement};
