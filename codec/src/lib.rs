//! Canonical, chain-agnostic encoding of governance payloads.
//!
//! The same versioned, length-prefixed record travels through a UTXO chain's
//! embeddable-data output and through contract call data:
//!
//! ```text
//! [version:1][tag:1][id:len8][proposer:len8][title:len16][description:len16]
//! [option_count:1]([option:len8])*[start_time:8][end_time:8][action...]
//! ```
//!
//! All integers are big-endian. The tag's high nibble is the chain, the low
//! nibble the proposal kind (`0xF` marks a vote payload instead).

pub mod error;
pub mod proposal;
pub mod vote;
mod wire;

pub use error::{DecodeError, EncodeError};
pub use proposal::{content_id, PayloadLimits, ProposalCodec};
pub use vote::VoteCodec;

/// Current payload format version.
pub const PAYLOAD_VERSION: u8 = 1;

/// Low tag nibble marking a vote payload.
pub const VOTE_KIND_NIBBLE: u8 = 0xF;

/// Largest single data push a UTXO-chain script may carry.
pub const MAX_DATA_CARRIER_BYTES: usize = 520;

/// Ceiling applied to contract-chain call data payloads.
pub const MAX_CALLDATA_PAYLOAD_BYTES: usize = 16 * 1024;

/// What a tagged payload contains, read from its first two bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadType {
    Proposal,
    Vote,
}

/// Classify a payload without decoding it. `None` for foreign data.
pub fn peek_payload_type(bytes: &[u8]) -> Option<PayloadType> {
    let (&version, rest) = bytes.split_first()?;
    let &tag = rest.first()?;
    if version != PAYLOAD_VERSION || tandem_types::Chain::from_tag_nibble(tag >> 4).is_none() {
        return None;
    }
    if tag & 0x0F == VOTE_KIND_NIBBLE {
        Some(PayloadType::Vote)
    } else {
        Some(PayloadType::Proposal)
    }
}
