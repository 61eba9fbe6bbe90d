use tandem_types::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssetError {
    #[error("not an asset commitment (bad {0})")]
    NotACommitment(&'static str),

    #[error("commitment metadata is {0} bytes")]
    MetadataTooLarge(usize),

    #[error("single metadata byte {0:#04x} must be pushed as an opcode")]
    NonMinimalMetadata(u8),

    #[error("asset amount must be non-zero")]
    ZeroAmount,

    #[error("owner key is not a valid x-only public key")]
    InvalidOwnerKey,

    #[error("taproot construction failed: {0}")]
    Taproot(String),
}

impl AssetError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}
