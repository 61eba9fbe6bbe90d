//! Governance engine: submission, voting, chain sync and closing.
//!
//! The engine composes the chain adapters, the governance ledger and the
//! status board. It keeps no state of its own beyond configuration, so any
//! number of engines may share one ledger.

use crate::error::GovernanceError;
use crate::params::{GovernanceParams, Outcome};
use crate::status::StatusBoard;
use crate::tally::{Tally, VoteTally};
use futures_util::future::join_all;
use futures_util::TryStreamExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use tandem_adapters::{ChainAdapter, ProposalFilter};
use tandem_codec::ProposalCodec;
use tandem_store::{GovernanceLedger, GovernanceStore};
use tandem_types::{
    Ballot, Chain, Proposal, ProposalId, ProposalStatus, TxRef, ValidationError,
};
use tandem_utils::Clock;
use tracing::{debug, warn};

/// A proposal accepted by its chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    pub tx: TxRef,
    /// Known up front for content-addressed proposals; contract ids are
    /// learned by the next [`GovernanceEngine::sync`].
    pub proposal_id: Option<ProposalId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Committed proposals read from the chain.
    pub seen: usize,
    /// Of those, proposals the ledger did not know yet.
    pub new: usize,
    /// Proposals moved from `Draft` to `Active`.
    pub activated: usize,
    /// Running count of undecodable payloads on this chain.
    pub skipped_payloads: u64,
}

/// What closing a vote decided.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Closure {
    pub tally: Tally,
    pub outcome: Outcome,
    /// Voters whose last vote failed the membership check at closing.
    pub excluded: Vec<String>,
    /// Last block inside the voting window.
    pub cutoff: Option<u64>,
    /// Block whose balances the membership check read; `None` when the
    /// chain only answers for its current balances.
    pub snapshot_height: Option<u64>,
}

pub struct GovernanceEngine {
    adapters: BTreeMap<Chain, Arc<dyn ChainAdapter>>,
    store: GovernanceStore,
    board: StatusBoard,
    codec: ProposalCodec,
    params: GovernanceParams,
    clock: Arc<dyn Clock>,
}

impl GovernanceEngine {
    pub fn new(
        ledger: Arc<dyn GovernanceLedger>,
        params: GovernanceParams,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GovernanceError> {
        params.validate()?;
        Ok(Self {
            adapters: BTreeMap::new(),
            store: GovernanceStore::new(ledger.clone()),
            board: StatusBoard::new(ledger),
            codec: ProposalCodec::default(),
            params,
            clock,
        })
    }

    /// Register the adapter for its chain, replacing any earlier one.
    pub fn with_adapter(mut self, adapter: Arc<dyn ChainAdapter>) -> Self {
        self.adapters.insert(adapter.chain(), adapter);
        self
    }

    pub fn adapter(&self, chain: Chain) -> Result<&Arc<dyn ChainAdapter>, GovernanceError> {
        self.adapters
            .get(&chain)
            .ok_or(GovernanceError::ChainNotConfigured(chain))
    }

    pub fn store(&self) -> &GovernanceStore {
        &self.store
    }

    pub fn board(&self) -> &StatusBoard {
        &self.board
    }

    pub fn params(&self) -> &GovernanceParams {
        &self.params
    }

    fn stored(&self, id: &ProposalId) -> Result<Proposal, GovernanceError> {
        self.store
            .get_proposal(id)?
            .ok_or(GovernanceError::ProposalNotFound(*id))
    }

    fn require_status(
        &self,
        id: &ProposalId,
        expected: ProposalStatus,
    ) -> Result<(), GovernanceError> {
        let found = self
            .board
            .current(id)?
            .ok_or(GovernanceError::ProposalNotFound(*id))?;
        if found != expected {
            return Err(GovernanceError::WrongStatus {
                id: *id,
                expected,
                found,
            });
        }
        Ok(())
    }

    /// Validate, gate on the proposal threshold, encode and commit.
    pub async fn submit(&self, proposal: &Proposal) -> Result<Submission, GovernanceError> {
        proposal.validate()?;
        self.params.check_window(proposal.body())?;
        let chain = proposal.chain();
        let adapter = self.adapter(chain)?;
        let proposer = proposal.proposer();
        if !adapter
            .is_member(&proposer, self.params.proposal_threshold())
            .await?
        {
            return Err(GovernanceError::NotMember {
                chain,
                address: proposer,
            });
        }
        let encoded = self.codec.encode(proposal)?;
        let tx = adapter.submit_proposal(&encoded).await?;
        debug!(%chain, tx = %tx, bytes = encoded.len(), "proposal submitted");
        Ok(Submission {
            tx,
            proposal_id: proposal.id(),
        })
    }

    /// Commit a vote on an active proposal inside its window.
    ///
    /// The voter must hold at least the weight they claim.
    pub async fn cast_vote(&self, ballot: &Ballot) -> Result<TxRef, GovernanceError> {
        let id = ballot.proposal_id;
        let proposal = self.stored(&id)?;
        self.require_status(&id, ProposalStatus::Active)?;
        let now = self.clock.now();
        let body = proposal.body();
        if now < body.start_time || now >= self.params.deadline(body) {
            return Err(GovernanceError::VotingClosed { id, at: now });
        }
        if usize::from(ballot.option_index) >= body.options.len() {
            return Err(ValidationError::UnknownOption(ballot.option_index.to_string()).into());
        }
        if ballot.weight.is_zero() {
            return Err(ValidationError::ZeroWeight.into());
        }
        let adapter = self.adapter(id.chain())?;
        if !adapter.is_member(&ballot.voter, ballot.weight).await? {
            return Err(GovernanceError::NotMember {
                chain: id.chain(),
                address: ballot.voter.clone(),
            });
        }
        let tx = adapter.cast_vote(&id, ballot).await?;
        debug!(proposal = %id, tx = %tx, "vote cast");
        Ok(tx)
    }

    /// Persist every committed proposal on `chain` and activate those whose
    /// start time has come.
    pub async fn sync(&self, chain: Chain) -> Result<SyncReport, GovernanceError> {
        let adapter = self.adapter(chain)?;
        let mut report = SyncReport::default();
        let mut proposals = adapter.fetch_proposals(ProposalFilter::default());
        while let Some(proposal) = proposals.try_next().await? {
            let id = self.store.put_proposal(&proposal)?;
            report.seen += 1;
            if self.board.register(&id)? {
                report.new += 1;
            }
        }
        drop(proposals);

        let now = self.clock.now();
        for proposal in self.store.list_proposals(Some(chain))? {
            let Some(id) = proposal.id() else { continue };
            if proposal.body().start_time > now
                || self.board.current(&id)? != Some(ProposalStatus::Draft)
            {
                continue;
            }
            match self.board.transition(
                &id,
                ProposalStatus::Draft,
                ProposalStatus::Active,
                now,
                None,
            ) {
                Ok(_) => report.activated += 1,
                // Another engine activated it first.
                Err(GovernanceError::StatusConflict { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        report.skipped_payloads = adapter.skipped_payloads();
        debug!(%chain, ?report, "chain synced");
        Ok(report)
    }

    /// Fetch, re-check and tally the votes of a proposal whose window has
    /// ended, then record the outcome.
    ///
    /// Only votes in blocks stamped inside the window count, and the chain
    /// must have a block past the deadline before the vote can close.
    /// Membership is re-checked at the window's last block where the chain
    /// keeps balance history.
    pub async fn close(&self, id: &ProposalId) -> Result<Closure, GovernanceError> {
        let proposal = self.stored(id)?;
        self.require_status(id, ProposalStatus::Active)?;
        let now = self.clock.now();
        let body = proposal.body();
        let window = self.params.window(body);
        if now < window.closes {
            return Err(GovernanceError::VotingOpen {
                id: *id,
                deadline: window.closes,
            });
        }
        let adapter = self.adapter(id.chain())?;
        let set = adapter.fetch_votes(&proposal, &window).await?;
        if !set.settled {
            debug!(proposal = %id, cutoff = ?set.cutoff, "no block past the deadline yet");
            return Err(GovernanceError::VotingOpen {
                id: *id,
                deadline: window.closes,
            });
        }
        let snapshot_height = if adapter.historical_membership() {
            set.cutoff
        } else {
            None
        };
        let latest = VoteTally.latest_per_voter(id, &set.votes);

        let checks = latest
            .iter()
            .map(|vote| adapter.is_member_at(&vote.voter, vote.weight, snapshot_height));
        let mut admitted = Vec::new();
        let mut excluded = Vec::new();
        let results = join_all(checks).await;
        for (vote, check) in latest.into_iter().zip(results) {
            match check {
                Ok(true) => admitted.push(vote),
                Ok(false) => {
                    warn!(proposal = %id, voter = %vote.voter, "vote weight exceeds voter balance, excluded");
                    excluded.push(vote.voter);
                }
                Err(e) if e.is_retryable() => return Err(e.into()),
                Err(e) => {
                    warn!(proposal = %id, voter = %vote.voter, error = %e, "voter balance unreadable, excluded");
                    excluded.push(vote.voter);
                }
            }
        }

        self.store.put_votes(id, &admitted)?;
        let tally = VoteTally.tally(id, &body.options, &admitted);
        let first = body.options.first().map_or("", String::as_str);
        let outcome = self.params.evaluate(&tally, first);
        let snapshot = snapshot_height.map_or_else(|| "current".to_string(), |h| h.to_string());
        self.board.transition(
            id,
            ProposalStatus::Active,
            outcome.status,
            now,
            Some(format!(
                "cast {} from {} voters; quorum {}, majority {}; balances at {}",
                outcome.cast, tally.voters, outcome.quorum_reached, outcome.majority_reached, snapshot
            )),
        )?;
        debug!(proposal = %id, status = %outcome.status, ?snapshot_height, "vote closed");
        Ok(Closure {
            tally,
            outcome,
            excluded,
            cutoff: set.cutoff,
            snapshot_height,
        })
    }

    pub fn status(&self, id: &ProposalId) -> Result<Option<ProposalStatus>, GovernanceError> {
        self.board.current(id)
    }

    /// Recompute the tally of a closed proposal from the stored votes.
    pub fn tally(&self, id: &ProposalId) -> Result<Tally, GovernanceError> {
        let proposal = self.stored(id)?;
        let votes = self.store.get_votes(id)?;
        Ok(VoteTally.tally(id, &proposal.body().options, &votes))
    }
}
