use tandem_adapters::ChainError;
use tandem_codec::EncodeError;
use tandem_store::StoreError;
use tandem_types::{Chain, ErrorKind, ProposalId, ProposalStatus, Timestamp, ValidationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("proposal {0} not found")]
    ProposalNotFound(ProposalId),

    #[error("no adapter configured for the {0} chain")]
    ChainNotConfigured(Chain),

    #[error("{address} is not a member of the DAO on the {chain} chain")]
    NotMember { chain: Chain, address: String },

    #[error("proposal {id} is {found}, expected {expected}")]
    WrongStatus {
        id: ProposalId,
        expected: ProposalStatus,
        found: ProposalStatus,
    },

    #[error("proposal {id} status changed concurrently: expected {expected}, found {found}")]
    StatusConflict {
        id: ProposalId,
        expected: ProposalStatus,
        found: ProposalStatus,
    },

    #[error("{from} -> {to} is not a valid status transition")]
    InvalidTransition {
        from: ProposalStatus,
        to: ProposalStatus,
    },

    #[error("voting on {id} is not open at {at}")]
    VotingClosed { id: ProposalId, at: Timestamp },

    #[error("voting on {id} runs until {deadline}")]
    VotingOpen { id: ProposalId, deadline: Timestamp },

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("payload encoding failed: {0}")]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("governance ledger: {0}")]
    Store(#[from] StoreError),
}

impl GovernanceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GovernanceError::NotMember { .. } => ErrorKind::Authorization,
            GovernanceError::StatusConflict {
                found: ProposalStatus::Executed,
                ..
            } => ErrorKind::AlreadyExecuted,
            GovernanceError::StatusConflict { .. } => ErrorKind::ConcurrentExecution,
            GovernanceError::Encode(e) => e.kind(),
            GovernanceError::Chain(e) => e.kind(),
            GovernanceError::Store(e) => e.kind(),
            GovernanceError::ProposalNotFound(_)
            | GovernanceError::ChainNotConfigured(_)
            | GovernanceError::WrongStatus { .. }
            | GovernanceError::InvalidTransition { .. }
            | GovernanceError::VotingClosed { .. }
            | GovernanceError::VotingOpen { .. }
            | GovernanceError::Invalid(_) => ErrorKind::Validation,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            GovernanceError::Chain(e) => e.is_retryable(),
            other => other.kind().is_retryable(),
        }
    }
}
