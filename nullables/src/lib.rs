//! Nullable infrastructure for deterministic testing.
//!
//! Every collaborator of the governance core (ledger, membership source,
//! clock, both chain nodes, the signing device) sits behind a trait. This
//! crate provides in-memory implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically (mine a block, fail a broadcast)
//! - Never touch the filesystem or network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod clock;
pub mod contract_chain;
pub mod device;
pub mod ledger;
pub mod membership;
pub mod utxo_chain;

pub use clock::NullClock;
pub use contract_chain::NullContractChain;
pub use device::{DeviceBehavior, NullDevice};
pub use ledger::NullLedger;
pub use membership::NullMembership;
pub use utxo_chain::NullUtxoChain;
