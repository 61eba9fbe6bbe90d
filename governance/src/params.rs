//! Governance parameters and closing evaluation.

use crate::tally::Tally;
use serde::{Deserialize, Serialize};
use tandem_types::{Amount, ProposalBody, ProposalStatus, Timestamp, ValidationError, VoteWindow};

/// Basis-point denominator (100% = 10_000).
pub const BPS: u32 = 10_000;

fn default_quorum_bps() -> u32 {
    5_100
}

fn default_majority_bps() -> u32 {
    5_100
}

fn default_min_voting_period() -> u64 {
    3_600
}

fn default_max_voting_period() -> u64 {
    86_400
}

fn default_proposal_threshold() -> u64 {
    100
}

fn default_eligible_weight() -> u64 {
    10_000
}

/// Thresholds every proposal is judged by. Loaded from `[governance]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceParams {
    /// Cast weight needed, as a share of `eligible_weight`.
    #[serde(default = "default_quorum_bps")]
    pub quorum_bps: u32,
    /// Share of cast weight the first option must reach.
    #[serde(default = "default_majority_bps")]
    pub majority_bps: u32,
    /// Seconds.
    #[serde(default = "default_min_voting_period")]
    pub min_voting_period: u64,
    /// Seconds. Also the deadline of proposals without an end time.
    #[serde(default = "default_max_voting_period")]
    pub max_voting_period: u64,
    /// Membership balance required to submit.
    #[serde(default = "default_proposal_threshold")]
    pub proposal_threshold: u64,
    /// Total voting weight the quorum is measured against.
    #[serde(default = "default_eligible_weight")]
    pub eligible_weight: u64,
}

impl Default for GovernanceParams {
    fn default() -> Self {
        Self {
            quorum_bps: default_quorum_bps(),
            majority_bps: default_majority_bps(),
            min_voting_period: default_min_voting_period(),
            max_voting_period: default_max_voting_period(),
            proposal_threshold: default_proposal_threshold(),
            eligible_weight: default_eligible_weight(),
        }
    }
}

/// Result of judging a closed vote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub status: ProposalStatus,
    pub cast: Amount,
    pub quorum_reached: bool,
    pub majority_reached: bool,
}

impl GovernanceParams {
    pub fn proposal_threshold(&self) -> Amount {
        Amount::from(self.proposal_threshold)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.quorum_bps > BPS || self.majority_bps > BPS {
            return Err(ValidationError::Other(
                "quorum and majority are basis points, at most 10000".into(),
            ));
        }
        if self.min_voting_period > self.max_voting_period {
            return Err(ValidationError::Other(
                "min_voting_period exceeds max_voting_period".into(),
            ));
        }
        if self.eligible_weight == 0 {
            return Err(ValidationError::Other("eligible_weight must be positive".into()));
        }
        Ok(())
    }

    /// Check the voting window of a new proposal, when it has an end.
    pub fn check_window(&self, body: &ProposalBody) -> Result<(), ValidationError> {
        let Some(end) = body.end_time else {
            return Ok(());
        };
        let period = body.start_time.secs_until(end);
        if period < self.min_voting_period || period > self.max_voting_period {
            return Err(ValidationError::Other(format!(
                "voting period of {period}s outside [{}, {}]",
                self.min_voting_period, self.max_voting_period
            )));
        }
        Ok(())
    }

    /// When voting closes: the end time, or the longest allowed period.
    pub fn deadline(&self, body: &ProposalBody) -> Timestamp {
        body.end_time
            .unwrap_or_else(|| body.start_time.plus_secs(self.max_voting_period))
    }

    /// Block times whose votes count: from the start up to, not including,
    /// the deadline.
    pub fn window(&self, body: &ProposalBody) -> VoteWindow {
        VoteWindow::new(body.start_time, self.deadline(body))
    }

    /// Judge a closed vote. `first_option` is the affirmative choice.
    pub fn evaluate(&self, tally: &Tally, first_option: &str) -> Outcome {
        let cast = tally.cast();
        let quorum_reached = reaches_bps(cast.raw(), u128::from(self.eligible_weight), self.quorum_bps);
        let majority_reached = !cast.is_zero()
            && reaches_bps(tally.weight(first_option).raw(), cast.raw(), self.majority_bps);
        let status = if !quorum_reached {
            ProposalStatus::Expired
        } else if !majority_reached {
            ProposalStatus::Rejected
        } else {
            ProposalStatus::Passed
        };
        Outcome {
            status,
            cast,
            quorum_reached,
            majority_reached,
        }
    }
}

/// `part / whole >= bps / 10_000`, without floating point.
fn reaches_bps(part: u128, whole: u128, bps: u32) -> bool {
    let (mut part, mut whole) = (part, whole);
    loop {
        match (
            part.checked_mul(u128::from(BPS)),
            whole.checked_mul(u128::from(bps)),
        ) {
            (Some(lhs), Some(rhs)) => return lhs >= rhs,
            // Scale both down; the ratio survives to well within one bps.
            _ => {
                part >>= 16;
                whole >>= 16;
            }
        }
    }
}
