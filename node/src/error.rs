use tandem_adapters::ChainError;
use tandem_governance::GovernanceError;
use tandem_treasury::TreasuryError;
use tandem_types::{Chain, ErrorKind, ProposalId, ValidationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("config error: {0}")]
    Config(String),

    #[error("no {0} chain section in the configuration")]
    ChainNotConfigured(Chain),

    #[error("proposal {0} not found on chain")]
    ProposalNotFound(ProposalId),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("governance error: {0}")]
    Governance(#[from] GovernanceError),

    #[error("treasury error: {0}")]
    Treasury(#[from] TreasuryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NodeError::Chain(e) => e.kind(),
            NodeError::Governance(e) => e.kind(),
            NodeError::Treasury(e) => e.kind(),
            NodeError::Io(_) => ErrorKind::Storage,
            NodeError::Config(_)
            | NodeError::ChainNotConfigured(_)
            | NodeError::ProposalNotFound(_)
            | NodeError::Invalid(_) => ErrorKind::Validation,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            NodeError::Chain(e) => e.is_retryable(),
            NodeError::Governance(e) => e.is_retryable(),
            NodeError::Treasury(e) => e.is_retryable(),
            other => other.kind().is_retryable(),
        }
    }
}
