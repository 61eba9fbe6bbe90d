//! Ledger key layout.

use tandem_types::ProposalId;

pub const PROPOSAL_PREFIX: &str = "proposal/";

pub fn proposal(id: &ProposalId) -> String {
    format!("{PROPOSAL_PREFIX}{id}")
}

pub fn votes(id: &ProposalId) -> String {
    format!("votes/{id}")
}

/// Current status plus event sequence; the compare-and-swap target.
pub fn status_head(id: &ProposalId) -> String {
    format!("status/{id}/head")
}

pub fn status_prefix(id: &ProposalId) -> String {
    format!("status/{id}/")
}

/// Zero-padded so that key order is sequence order.
pub fn status_event(id: &ProposalId, seq: u32) -> String {
    format!("status/{id}/{seq:010}")
}
