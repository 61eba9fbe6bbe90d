//! Error taxonomy shared across crates.
//!
//! Each crate defines its own error enum; every one of them maps onto an
//! [`ErrorKind`] so callers can apply one propagation policy: validation and
//! authorization failures are surfaced and never retried, chain
//! unavailability is retried by the caller with backoff.

use thiserror::Error;

/// The failure classes every core operation reports through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed proposal, vote, or encoding.
    Validation,
    /// Caller failed the membership gate.
    Authorization,
    /// Coin selection could not cover outputs plus fee.
    InsufficientFunds,
    /// Encoding exceeds the chain's embeddable-data limit.
    PayloadTooLarge,
    /// RPC or network failure; retryable with backoff.
    ChainUnavailable,
    /// The network rejected a broadcast.
    Broadcast,
    /// Another executor changed the proposal status first.
    ConcurrentExecution,
    /// The proposal has already been executed.
    AlreadyExecuted,
    /// Key material could not be decrypted.
    Decryption,
    /// Hierarchical key derivation failed.
    Derivation,
    /// The governance ledger failed.
    Storage,
}

impl ErrorKind {
    /// Whether a caller may retry the operation after backing off.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::ChainUnavailable)
    }
}

/// A structural problem with a proposal, vote, or allocation policy.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("proposal needs at least 2 options, got {0}")]
    TooFewOptions(usize),

    #[error("proposal has too many options: {0} (max 255)")]
    TooManyOptions(usize),

    #[error("duplicate option: {0}")]
    DuplicateOption(String),

    #[error("option labels must not be empty")]
    EmptyOption,

    #[error("proposal title must not be empty")]
    EmptyTitle,

    #[error("end time {end} must be after start time {start}")]
    EndBeforeStart { start: u64, end: u64 },

    #[error("option {0} is not one of the proposal's options")]
    UnknownOption(String),

    #[error("action amount must be positive")]
    ZeroAmount,

    #[error("recipient must not be empty")]
    EmptyRecipient,

    #[error("vote weight must be positive")]
    ZeroWeight,

    #[error("{0}")]
    Other(String),
}
