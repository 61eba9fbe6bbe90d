//! Proposal lifecycle for a two-chain DAO.
//!
//! ```text
//! Draft → Active → {Passed, Rejected, Expired}
//! Passed → Executing → {Executed, Failed}
//! ```
//!
//! - [`VoteTally`]: last vote per voter in chain order, summed per option
//! - [`StatusBoard`]: compare-and-swap status transitions over the ledger
//! - [`GovernanceParams`]: quorum and majority evaluation at closing
//! - [`GovernanceEngine`]: submit, vote, sync and close through the adapters
//!
//! Only `Passed → Executing → {Executed, Failed}` belongs to the treasury;
//! every earlier transition is made here.

pub mod engine;
pub mod error;
pub mod params;
pub mod status;
pub mod tally;

pub use engine::{Closure, GovernanceEngine, Submission, SyncReport};
pub use error::GovernanceError;
pub use params::{GovernanceParams, Outcome, BPS};
pub use status::StatusBoard;
pub use tally::{Tally, VoteTally};
