use tandem_adapters::ChainError;
use tandem_assets::AssetError;
use tandem_governance::GovernanceError;
use tandem_store::StoreError;
use tandem_transactions::BuildError;
use tandem_types::{Amount, Chain, ErrorKind, ProposalId, ProposalStatus};
use tandem_wallet_core::WalletError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreasuryError {
    #[error("proposal {0} has already been executed")]
    AlreadyExecuted(ProposalId),

    #[error("proposal {id} is already being handled by another executor ({found})")]
    ConcurrentExecution { id: ProposalId, found: ProposalStatus },

    #[error("proposal {id} is {found}, only passed proposals execute")]
    NotPassed { id: ProposalId, found: ProposalStatus },

    #[error("{address} may not execute proposals on the {chain} chain")]
    NotAuthorized { chain: Chain, address: String },

    #[error("no adapter configured for the {0} chain")]
    ChainNotConfigured(Chain),

    #[error("no treasury signer configured for the {0} chain")]
    SignerNotConfigured(Chain),

    #[error("invalid recipient {recipient}: {reason}")]
    InvalidRecipient { recipient: String, reason: String },

    #[error("amount {0} does not fit a native output")]
    AmountOutOfRange(Amount),

    #[error("invalid allocation policy: {0}")]
    InvalidPolicy(String),

    #[error("execution of {id} failed")]
    ExecutionFailed {
        id: ProposalId,
        #[source]
        source: Box<TreasuryError>,
    },

    #[error(transparent)]
    Governance(#[from] GovernanceError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("transaction build failed: {0}")]
    Build(#[from] BuildError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("governance ledger: {0}")]
    Store(#[from] StoreError),
}

impl TreasuryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TreasuryError::AlreadyExecuted(_) => ErrorKind::AlreadyExecuted,
            TreasuryError::ConcurrentExecution { .. } => ErrorKind::ConcurrentExecution,
            TreasuryError::NotAuthorized { .. } => ErrorKind::Authorization,
            TreasuryError::ExecutionFailed { source, .. } => source.kind(),
            TreasuryError::Governance(e) => e.kind(),
            TreasuryError::Chain(e) => e.kind(),
            TreasuryError::Build(e) => e.kind(),
            TreasuryError::Wallet(e) => e.kind(),
            TreasuryError::Asset(e) => e.kind(),
            TreasuryError::Store(e) => e.kind(),
            TreasuryError::NotPassed { .. }
            | TreasuryError::ChainNotConfigured(_)
            | TreasuryError::SignerNotConfigured(_)
            | TreasuryError::InvalidRecipient { .. }
            | TreasuryError::AmountOutOfRange(_)
            | TreasuryError::InvalidPolicy(_) => ErrorKind::Validation,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            TreasuryError::ExecutionFailed { source, .. } => source.is_retryable(),
            TreasuryError::Chain(e) => e.is_retryable(),
            TreasuryError::Governance(e) => e.is_retryable(),
            other => other.kind().is_retryable(),
        }
    }
}
