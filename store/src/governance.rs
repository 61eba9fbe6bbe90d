//! Typed access to proposals and votes in the governance ledger.

use crate::keys;
use crate::{GovernanceLedger, StoreError};
use std::sync::Arc;
use tandem_types::{Chain, Proposal, ProposalId, Vote};

#[derive(Clone)]
pub struct GovernanceStore {
    ledger: Arc<dyn GovernanceLedger>,
}

impl GovernanceStore {
    pub fn new(ledger: Arc<dyn GovernanceLedger>) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &Arc<dyn GovernanceLedger> {
        &self.ledger
    }

    /// Persist a committed proposal. Idempotent for an unchanged proposal.
    pub fn put_proposal(&self, proposal: &Proposal) -> Result<ProposalId, StoreError> {
        let id = proposal
            .id()
            .ok_or_else(|| StoreError::Corruption("draft proposals have no ledger key".into()))?;
        self.ledger
            .put(&keys::proposal(&id), &bincode::serialize(proposal)?)?;
        Ok(id)
    }

    pub fn get_proposal(&self, id: &ProposalId) -> Result<Option<Proposal>, StoreError> {
        self.ledger
            .get(&keys::proposal(id))?
            .map(|bytes| bincode::deserialize(&bytes).map_err(StoreError::from))
            .transpose()
    }

    pub fn proposal(&self, id: &ProposalId) -> Result<Proposal, StoreError> {
        self.get_proposal(id)?
            .ok_or_else(|| StoreError::NotFound(keys::proposal(id)))
    }

    pub fn list_proposals(&self, chain: Option<Chain>) -> Result<Vec<Proposal>, StoreError> {
        let mut out = Vec::new();
        for (_, bytes) in self.ledger.scan_prefix(keys::PROPOSAL_PREFIX)? {
            let proposal: Proposal = bincode::deserialize(&bytes)?;
            if chain.map_or(true, |c| proposal.chain() == c) {
                out.push(proposal);
            }
        }
        Ok(out)
    }

    /// Replace the committed vote set observed for a proposal.
    pub fn put_votes(&self, id: &ProposalId, votes: &[Vote]) -> Result<(), StoreError> {
        self.ledger.put(&keys::votes(id), &bincode::serialize(votes)?)
    }

    pub fn get_votes(&self, id: &ProposalId) -> Result<Vec<Vote>, StoreError> {
        match self.ledger.get(&keys::votes(id))? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Ok(Vec::new()),
        }
    }
}
