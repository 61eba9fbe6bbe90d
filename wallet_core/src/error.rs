use tandem_types::{ErrorKind, ScriptType};
use thiserror::Error;

/// Hierarchical derivation or seed handling failed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DerivationError {
    #[error("invalid derivation path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("invalid seed: {0}")]
    InvalidSeed(String),

    #[error("invalid mnemonic phrase: {0}")]
    InvalidMnemonic(String),

    #[error("entropy source failed: {0}")]
    Entropy(String),
}

/// Key material at rest could not be recovered. Never yields partial plaintext.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecryptionError {
    #[error("decryption failed: wrong password or corrupted data")]
    Authentication,

    #[error("unsupported keystore version {0}")]
    UnsupportedVersion(u32),

    #[error("keystore uses {0} KDF iterations, below the minimum")]
    WeakKdf(u32),

    #[error("unsupported {field}: {value}")]
    Unsupported { field: &'static str, value: String },

    #[error("malformed keystore field {field}: {reason}")]
    Malformed { field: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum WalletError {
    #[error(transparent)]
    Derivation(#[from] DerivationError),

    #[error(transparent)]
    Decryption(#[from] DecryptionError),

    #[error("keystore encryption failed: {0}")]
    Encryption(String),

    #[error("keystore I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("keystore JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("input {index} out of range for a {inputs}-input transaction")]
    InputOutOfRange { index: usize, inputs: usize },

    #[error("input {index}: signing key does not control this {script_type:?} output")]
    KeyMismatch { index: usize, script_type: ScriptType },

    #[error("input {index}: {reason}")]
    Signing { index: usize, reason: String },

    #[error("signing device: {0}")]
    Device(String),
}

impl WalletError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::Derivation(_) => ErrorKind::Derivation,
            WalletError::Decryption(_) => ErrorKind::Decryption,
            WalletError::Io(_) => ErrorKind::Storage,
            WalletError::KeyMismatch { .. } | WalletError::Device(_) => ErrorKind::Authorization,
            _ => ErrorKind::Validation,
        }
    }
}
