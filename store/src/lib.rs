//! Storage and admission boundaries for the governance core.
//!
//! The core depends only on these traits. The ledger is an at-least-once
//! durable key/value surface, not a transactional database; the only
//! atomic primitive it must offer is a single-key compare-and-swap.

pub mod error;
pub mod governance;
pub mod keys;
pub mod ledger;
pub mod membership;
pub mod memory;

pub use error::StoreError;
pub use governance::GovernanceStore;
pub use ledger::GovernanceLedger;
pub use membership::{MembershipAsset, MembershipSource};
pub use memory::MemoryLedger;
