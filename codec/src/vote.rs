//! Vote payloads: `[version][tag][id:len8][voter:len8][option_index:1][weight:16]`.
//!
//! Carried in an embeddable-data output on the UTXO chain. Contract-chain
//! votes go through the contract's `vote` call and are never encoded here,
//! but the format accepts either chain so the payload stays self-describing.

use crate::error::{DecodeError, EncodeError};
use crate::wire::{Reader, Writer};
use crate::{PAYLOAD_VERSION, VOTE_KIND_NIBBLE};
use tandem_types::{Amount, Ballot, Chain, ProposalId, ValidationError};

#[derive(Clone, Copy, Debug)]
pub struct VoteCodec {
    limit: usize,
}

impl VoteCodec {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    pub fn encode(&self, ballot: &Ballot) -> Result<Vec<u8>, EncodeError> {
        if ballot.voter.is_empty() {
            return Err(ValidationError::Other("voter must not be empty".into()).into());
        }
        if ballot.weight.is_zero() {
            return Err(ValidationError::ZeroWeight.into());
        }
        let chain = ballot.proposal_id.chain();
        if ballot.voter.len() > u8::MAX as usize {
            return Err(EncodeError::PayloadTooLarge {
                chain,
                size: ballot.voter.len(),
                limit: self.limit,
            });
        }
        let mut w = Writer::default();
        w.u8(PAYLOAD_VERSION);
        w.u8((chain.tag_nibble() << 4) | VOTE_KIND_NIBBLE);
        w.bytes8(&ballot.proposal_id.to_bytes());
        w.bytes8(ballot.voter.as_bytes());
        w.u8(ballot.option_index);
        w.u128(ballot.weight.raw());
        let bytes = w.into_inner();
        if bytes.len() > self.limit {
            return Err(EncodeError::PayloadTooLarge {
                chain,
                size: bytes.len(),
                limit: self.limit,
            });
        }
        Ok(bytes)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Ballot, DecodeError> {
        let mut r = Reader::new(bytes);
        let version = r.u8("version")?;
        if version != PAYLOAD_VERSION {
            return Err(DecodeError::UnknownVersion(version));
        }
        let tag = r.u8("tag")?;
        let chain = Chain::from_tag_nibble(tag >> 4).ok_or(DecodeError::UnknownChain(tag >> 4))?;
        if tag & 0x0F != VOTE_KIND_NIBBLE {
            return Err(DecodeError::NotAVote);
        }
        let raw_id = r.bytes8("proposal id")?;
        let proposal_id = match chain {
            Chain::Utxo => ProposalId::Content(
                raw_id
                    .try_into()
                    .map_err(|_| DecodeError::Malformed("proposal id"))?,
            ),
            Chain::Contract => {
                let arr: [u8; 8] = raw_id
                    .try_into()
                    .map_err(|_| DecodeError::Malformed("proposal id"))?;
                ProposalId::Contract(u64::from_be_bytes(arr))
            }
        };
        let voter = r.str8("voter")?;
        let option_index = r.u8("option index")?;
        let weight = Amount::new(r.u128("weight")?);
        r.finish()?;
        if voter.is_empty() {
            return Err(DecodeError::Malformed("voter"));
        }
        if weight.is_zero() {
            return Err(ValidationError::ZeroWeight.into());
        }
        Ok(Ballot {
            proposal_id,
            voter,
            option_index,
            weight,
        })
    }
}

impl Default for VoteCodec {
    fn default() -> Self {
        Self::new(crate::MAX_DATA_CARRIER_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{peek_payload_type, PayloadType};

    fn ballot() -> Ballot {
        Ballot {
            proposal_id: ProposalId::Content([0xAB; 32]),
            voter: "bc1qvoter".into(),
            option_index: 1,
            weight: Amount::new(5),
        }
    }

    #[test]
    fn ballot_roundtrips() {
        let codec = VoteCodec::default();
        let bytes = codec.encode(&ballot()).unwrap();
        assert_eq!(bytes[1], 0x1F);
        assert_eq!(peek_payload_type(&bytes), Some(PayloadType::Vote));
        assert_eq!(codec.decode(&bytes).unwrap(), ballot());
    }

    #[test]
    fn zero_weight_is_rejected() {
        let mut b = ballot();
        b.weight = Amount::ZERO;
        assert_eq!(
            VoteCodec::default().encode(&b),
            Err(EncodeError::Invalid(ValidationError::ZeroWeight))
        );
    }

    #[test]
    fn proposal_payload_is_not_a_vote() {
        let mut bytes = VoteCodec::default().encode(&ballot()).unwrap();
        bytes[1] = 0x10;
        assert_eq!(VoteCodec::default().decode(&bytes), Err(DecodeError::NotAVote));
    }

    #[test]
    fn wrong_id_width_for_chain() {
        let mut b = ballot();
        b.proposal_id = ProposalId::Contract(3);
        let mut bytes = VoteCodec::default().encode(&b).unwrap();
        bytes[1] = 0x1F;
        assert_eq!(
            VoteCodec::default().decode(&bytes),
            Err(DecodeError::Malformed("proposal id"))
        );
    }

    #[test]
    fn foreign_data_is_not_classified() {
        assert_eq!(peek_payload_type(b"hello world"), None);
        assert_eq!(peek_payload_type(&[]), None);
    }
}
