//! Proposal status board.
//!
//! The head record `status/<id>/head` holds the current status and event
//! count and is only ever replaced by compare-and-swap against the bytes the
//! caller read, so of two racing transitions from the same status exactly
//! one wins. Each accepted transition is appended as `status/<id>/<seq>`.

use crate::error::GovernanceError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tandem_store::{keys, GovernanceLedger, StoreError};
use tandem_types::{ProposalId, ProposalStatus, StatusEvent, Timestamp};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct Head {
    status: ProposalStatus,
    /// Events written so far.
    events: u32,
}

#[derive(Clone)]
pub struct StatusBoard {
    ledger: Arc<dyn GovernanceLedger>,
}

impl StatusBoard {
    pub fn new(ledger: Arc<dyn GovernanceLedger>) -> Self {
        Self { ledger }
    }

    fn read_head(&self, id: &ProposalId) -> Result<Option<(Vec<u8>, Head)>, GovernanceError> {
        match self.ledger.get(&keys::status_head(id))? {
            Some(bytes) => {
                let head: Head = bincode::deserialize(&bytes).map_err(StoreError::from)?;
                Ok(Some((bytes, head)))
            }
            None => Ok(None),
        }
    }

    /// Current status; `None` for proposals never recorded.
    pub fn current(&self, id: &ProposalId) -> Result<Option<ProposalStatus>, GovernanceError> {
        Ok(self.read_head(id)?.map(|(_, head)| head.status))
    }

    /// Record a newly observed proposal as `Draft`. Returns false when it
    /// already has a status.
    pub fn register(&self, id: &ProposalId) -> Result<bool, GovernanceError> {
        let head = Head {
            status: ProposalStatus::Draft,
            events: 0,
        };
        let bytes = bincode::serialize(&head).map_err(StoreError::from)?;
        Ok(self
            .ledger
            .compare_and_swap(&keys::status_head(id), None, &bytes)?)
    }

    /// Move `id` from `from` to `to`.
    ///
    /// Fails with [`GovernanceError::StatusConflict`] when the stored status
    /// is not `from`, including when another caller changed it between the
    /// read and the swap.
    pub fn transition(
        &self,
        id: &ProposalId,
        from: ProposalStatus,
        to: ProposalStatus,
        at: Timestamp,
        reason: Option<String>,
    ) -> Result<StatusEvent, GovernanceError> {
        if !from.can_transition_to(to) {
            return Err(GovernanceError::InvalidTransition { from, to });
        }
        let key = keys::status_head(id);
        let (raw, head) = self
            .read_head(id)?
            .ok_or(GovernanceError::ProposalNotFound(*id))?;
        if head.status != from {
            return Err(GovernanceError::StatusConflict {
                id: *id,
                expected: from,
                found: head.status,
            });
        }
        let next = Head {
            status: to,
            events: head.events + 1,
        };
        let bytes = bincode::serialize(&next).map_err(StoreError::from)?;
        if !self.ledger.compare_and_swap(&key, Some(&raw), &bytes)? {
            let found = self.current(id)?.unwrap_or(from);
            return Err(GovernanceError::StatusConflict {
                id: *id,
                expected: from,
                found,
            });
        }
        let event = StatusEvent {
            proposal_id: *id,
            from,
            to,
            at,
            reason,
        };
        // The head already moved; the event log is at-least-once.
        self.ledger.put(
            &keys::status_event(id, next.events),
            &bincode::serialize(&event).map_err(StoreError::from)?,
        )?;
        debug!(proposal = %id, %from, %to, "status transition");
        Ok(event)
    }

    /// Every recorded transition, oldest first.
    pub fn history(&self, id: &ProposalId) -> Result<Vec<StatusEvent>, GovernanceError> {
        let head_key = keys::status_head(id);
        self.ledger
            .scan_prefix(&keys::status_prefix(id))?
            .into_iter()
            .filter(|(key, _)| *key != head_key)
            .map(|(_, bytes)| {
                bincode::deserialize(&bytes)
                    .map_err(|e| GovernanceError::Store(StoreError::from(e)))
            })
            .collect()
    }
}
