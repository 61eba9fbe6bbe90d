use tandem_assets::AssetError;
use tandem_codec::{DecodeError, EncodeError};
use tandem_store::StoreError;
use tandem_transactions::BuildError;
use tandem_types::{Chain, ErrorKind, ProposalId, ValidationError};
use tandem_wallet_core::WalletError;
use thiserror::Error;

use crate::abi::AbiError;

/// Why the network refused a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BroadcastReason {
    /// Fee below the relay minimum; retry with a bumped fee.
    FeeTooLow,
    /// An input is already spent; never retried.
    DoubleSpend,
    Rejected,
}

#[derive(Debug, Error)]
#[error("{chain} broadcast rejected ({reason:?}): {message}")]
pub struct BroadcastError {
    pub chain: Chain,
    pub reason: BroadcastReason,
    pub message: String,
}

impl BroadcastError {
    /// Classify a node's rejection message.
    pub fn classify(chain: Chain, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        let reason = if lower.contains("min relay fee not met")
            || lower.contains("insufficient fee")
            || lower.contains("mempool min fee not met")
            || lower.contains("underpriced")
        {
            BroadcastReason::FeeTooLow
        } else if lower.contains("bad-txns-inputs-missingorspent")
            || lower.contains("txn-mempool-conflict")
            || lower.contains("nonce too low")
        {
            BroadcastReason::DoubleSpend
        } else {
            BroadcastReason::Rejected
        };
        Self {
            chain,
            reason,
            message,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.reason == BroadcastReason::FeeTooLow
    }
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("{chain} chain unavailable during {method}: {reason}")]
    Unavailable {
        chain: Chain,
        method: String,
        reason: String,
    },

    #[error("{chain} rpc {method} failed with code {code}: {message}")]
    Rpc {
        chain: Chain,
        method: String,
        code: i64,
        message: String,
    },

    #[error("{chain} rpc {method} returned an unexpected response: {reason}")]
    InvalidResponse {
        chain: Chain,
        method: String,
        reason: String,
    },

    #[error(transparent)]
    Broadcast(#[from] BroadcastError),

    #[error("invalid {chain} address {address}: {reason}")]
    InvalidAddress {
        chain: Chain,
        address: String,
        reason: String,
    },

    #[error("no signing wallet for {address} on the {chain} chain")]
    NotAuthorized { chain: Chain, address: String },

    #[error("{chain} adapter does not support {operation}")]
    Unsupported {
        chain: Chain,
        operation: &'static str,
    },

    #[error("{chain} adapter has no {what} configured")]
    NotConfigured { chain: Chain, what: &'static str },

    #[error("proposal {0} does not belong to this chain")]
    WrongChain(ProposalId),

    #[error("payload encoding failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("payload decoding failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("contract abi: {0}")]
    Abi(#[from] AbiError),

    #[error("asset commitment: {0}")]
    Asset(#[from] AssetError),

    #[error("transaction build failed: {0}")]
    Build(#[from] BuildError),

    #[error("signing failed: {0}")]
    Wallet(#[from] WalletError),

    #[error("membership lookup failed: {0}")]
    Membership(#[from] StoreError),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

impl ChainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChainError::Unavailable { .. } | ChainError::InvalidResponse { .. } => {
                ErrorKind::ChainUnavailable
            }
            ChainError::Broadcast(_) => ErrorKind::Broadcast,
            ChainError::NotAuthorized { .. } => ErrorKind::Authorization,
            ChainError::Encode(e) => e.kind(),
            ChainError::Build(e) => e.kind(),
            ChainError::Wallet(e) => e.kind(),
            ChainError::Membership(e) => e.kind(),
            ChainError::Asset(e) => e.kind(),
            ChainError::Rpc { .. }
            | ChainError::InvalidAddress { .. }
            | ChainError::Unsupported { .. }
            | ChainError::NotConfigured { .. }
            | ChainError::WrongChain(_)
            | ChainError::Decode(_)
            | ChainError::Abi(_)
            | ChainError::Invalid(_) => ErrorKind::Validation,
        }
    }

    /// True for chain unavailability and fee-too-low rejections only.
    pub fn is_retryable(&self) -> bool {
        match self {
            ChainError::Broadcast(b) => b.is_retryable(),
            other => other.kind().is_retryable(),
        }
    }

    pub(crate) fn invalid_response(
        chain: Chain,
        method: &str,
        reason: impl std::fmt::Display,
    ) -> Self {
        ChainError::InvalidResponse {
            chain,
            method: method.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_rejections_are_retryable() {
        let err = BroadcastError::classify(Chain::Utxo, "min relay fee not met, 100 < 141");
        assert_eq!(err.reason, BroadcastReason::FeeTooLow);
        assert!(ChainError::from(err).is_retryable());
    }

    #[test]
    fn double_spends_are_fatal() {
        for msg in ["bad-txns-inputs-missingorspent", "txn-mempool-conflict"] {
            let err = ChainError::from(BroadcastError::classify(Chain::Utxo, msg));
            assert_eq!(err.kind(), ErrorKind::Broadcast);
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn other_rejections_are_not_retried() {
        let err = BroadcastError::classify(Chain::Utxo, "scriptpubkey");
        assert_eq!(err.reason, BroadcastReason::Rejected);
        assert!(!err.is_retryable());
    }

    #[test]
    fn unavailability_is_retryable() {
        let err = ChainError::Unavailable {
            chain: Chain::Contract,
            method: "eth_blockNumber".into(),
            reason: "timed out".into(),
        };
        assert!(err.is_retryable());
        assert!(!ChainError::WrongChain(ProposalId::Contract(1)).is_retryable());
    }

    #[test]
    fn missing_voter_wallet_is_an_authorization_error() {
        let err = ChainError::NotAuthorized {
            chain: Chain::Utxo,
            address: "bcrt1qalice".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert!(!err.is_retryable());
    }
}
