use tandem_types::{Chain, ErrorKind, ValidationError};
use thiserror::Error;

/// Why a payload could not be produced.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("{chain} payload is {size} bytes, limit is {limit}")]
    PayloadTooLarge {
        chain: Chain,
        size: usize,
        limit: usize,
    },

    #[error("invalid proposal: {0}")]
    Invalid(#[from] ValidationError),
}

impl EncodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EncodeError::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            EncodeError::Invalid(_) => ErrorKind::Validation,
        }
    }
}

/// Why a payload was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown payload version {0}")]
    UnknownVersion(u8),

    #[error("payload truncated while reading {0}")]
    Truncated(&'static str),

    #[error("unknown chain nibble {0:#x}")]
    UnknownChain(u8),

    #[error("unknown proposal kind nibble {0:#x}")]
    UnknownKind(u8),

    #[error("payload is a vote, not a proposal")]
    NotAProposal,

    #[error("payload is a proposal, not a vote")]
    NotAVote,

    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),

    #[error("malformed {0}")]
    Malformed(&'static str),

    #[error("content id does not match the payload body")]
    IdMismatch,

    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),

    #[error("invalid proposal: {0}")]
    Invalid(#[from] ValidationError),
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}
