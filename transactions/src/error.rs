use tandem_assets::AssetError;
use tandem_types::{Amount, AssetId, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("transaction has no outputs")]
    NoOutputs,

    #[error("insufficient funds: need {needed} sat, have {available} sat")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("insufficient {asset_id}: need {needed}, have {available}")]
    InsufficientAssets {
        asset_id: AssetId,
        needed: Amount,
        available: Amount,
    },

    #[error("output of {amount} sat is below the dust threshold of {threshold}")]
    BelowDust { amount: u64, threshold: u64 },

    #[error("amount must be positive")]
    ZeroAmount,

    #[error("data output of {0} bytes cannot be pushed")]
    DataTooLarge(usize),

    #[error("input list does not match the transaction inputs")]
    InputMismatch,

    #[error("value overflow")]
    Overflow,

    #[error(transparent)]
    Asset(#[from] AssetError),
}

impl BuildError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BuildError::InsufficientFunds { .. } | BuildError::InsufficientAssets { .. } => {
                ErrorKind::InsufficientFunds
            }
            BuildError::DataTooLarge(_) => ErrorKind::PayloadTooLarge,
            _ => ErrorKind::Validation,
        }
    }
}
