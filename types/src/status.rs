//! Proposal status state machine.
//!
//! ```text
//! Draft → Active → {Passed, Rejected, Expired}
//! Passed → Executing → {Executed, Failed}
//! ```
//!
//! Terminal: Rejected, Expired, Executed, Failed.

use crate::proposal::ProposalId;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProposalStatus {
    /// Built off-chain, not yet confirmed or not yet started.
    Draft,
    /// Accepting votes.
    Active,
    /// Vote closed with quorum and majority for the first option.
    Passed,
    /// Vote closed with quorum but without majority.
    Rejected,
    /// Vote closed without quorum.
    Expired,
    /// Execution dispatched; at most one executor holds this.
    Executing,
    /// Execution landed.
    Executed,
    /// Execution failed; the cause is recorded on the transition event.
    Failed,
}

impl ProposalStatus {
    /// Whether `self → next` is an edge of the state machine.
    pub fn can_transition_to(&self, next: ProposalStatus) -> bool {
        use ProposalStatus::*;
        matches!(
            (self, next),
            (Draft, Active)
                | (Active, Passed)
                | (Active, Rejected)
                | (Active, Expired)
                | (Passed, Executing)
                | (Executing, Executed)
                | (Executing, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProposalStatus::Rejected
                | ProposalStatus::Expired
                | ProposalStatus::Executed
                | ProposalStatus::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Draft => "draft",
            ProposalStatus::Active => "active",
            ProposalStatus::Passed => "passed",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::Expired => "expired",
            ProposalStatus::Executing => "executing",
            ProposalStatus::Executed => "executed",
            ProposalStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only status transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub proposal_id: ProposalId,
    pub from: ProposalStatus,
    pub to: ProposalStatus,
    pub at: Timestamp,
    /// Failure cause or other context for the transition.
    pub reason: Option<String>,
}
