use crate::error::{DecodeError, EncodeError};
use crate::wire::{Reader, Writer};
use crate::{MAX_CALLDATA_PAYLOAD_BYTES, MAX_DATA_CARRIER_BYTES, PAYLOAD_VERSION, VOTE_KIND_NIBBLE};
use sha2::{Digest, Sha256};
use tandem_types::{
    Amount, AssetId, Chain, ContractAction, EvmAddress, Proposal, ProposalBody, ProposalKind,
    Timestamp, UtxoAction,
};

/// Per-chain payload ceilings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PayloadLimits {
    pub utxo: usize,
    pub contract: usize,
}

impl PayloadLimits {
    pub fn for_chain(&self, chain: Chain) -> usize {
        match chain {
            Chain::Utxo => self.utxo,
            Chain::Contract => self.contract,
        }
    }
}

impl Default for PayloadLimits {
    fn default() -> Self {
        Self {
            utxo: MAX_DATA_CARRIER_BYTES,
            contract: MAX_CALLDATA_PAYLOAD_BYTES,
        }
    }
}

/// Encodes proposals into their canonical byte form and back.
///
/// `decode(encode(p)) == p` for every valid proposal that fits the limit.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProposalCodec {
    limits: PayloadLimits,
}

impl ProposalCodec {
    pub fn new(limits: PayloadLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> PayloadLimits {
        self.limits
    }

    /// Build a UTXO-chain proposal whose id is the hash of its own content.
    pub fn new_utxo_proposal(
        &self,
        proposer: impl Into<String>,
        body: ProposalBody,
        action: UtxoAction,
    ) -> Result<Proposal, EncodeError> {
        let mut proposal = Proposal::Utxo {
            id: [0u8; 32],
            proposer: proposer.into(),
            body,
            action,
        };
        proposal.validate()?;
        let id = content_id(&proposal);
        if let Proposal::Utxo { id: slot, .. } = &mut proposal {
            *slot = id;
        }
        // Runs the size check against the final form.
        self.encode(&proposal)?;
        Ok(proposal)
    }

    /// Canonical bytes for `proposal`.
    ///
    /// Contract drafts (no id yet) encode with an empty id field; that form is
    /// what gets submitted to the DAO contract.
    pub fn encode(&self, proposal: &Proposal) -> Result<Vec<u8>, EncodeError> {
        proposal.validate()?;
        check_field_lengths(proposal)?;
        let bytes = encode_with_id(proposal, true);
        let limit = self.limits.for_chain(proposal.chain());
        if bytes.len() > limit {
            return Err(EncodeError::PayloadTooLarge {
                chain: proposal.chain(),
                size: bytes.len(),
                limit,
            });
        }
        Ok(bytes)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Proposal, DecodeError> {
        let mut r = Reader::new(bytes);
        let version = r.u8("version")?;
        if version != PAYLOAD_VERSION {
            return Err(DecodeError::UnknownVersion(version));
        }
        let tag = r.u8("tag")?;
        let chain = Chain::from_tag_nibble(tag >> 4).ok_or(DecodeError::UnknownChain(tag >> 4))?;
        let nibble = tag & 0x0F;
        if nibble == VOTE_KIND_NIBBLE {
            return Err(DecodeError::NotAProposal);
        }
        let kind = ProposalKind::from_nibble(nibble).ok_or(DecodeError::UnknownKind(nibble))?;
        let id = r.bytes8("id")?;
        let proposer = r.bytes8("proposer")?;
        let body = read_body(&mut r)?;

        let proposal = match chain {
            Chain::Utxo => {
                let action = match kind {
                    ProposalKind::Signal => UtxoAction::Signal,
                    ProposalKind::Spend => {
                        let recipient = r.str8("recipient")?;
                        let amount = Amount::new(r.u128("amount")?);
                        UtxoAction::Spend { recipient, amount }
                    }
                    ProposalKind::AssetTransfer => {
                        let key = r.bytes8("recipient")?;
                        let recipient_key: [u8; 32] = key
                            .try_into()
                            .map_err(|_| DecodeError::Malformed("recipient key"))?;
                        let amount = Amount::new(r.u128("amount")?);
                        let asset_id = AssetId::new(r.array32("asset id")?);
                        UtxoAction::AssetTransfer {
                            recipient_key,
                            asset_id,
                            amount,
                        }
                    }
                };
                let id: [u8; 32] = id.try_into().map_err(|_| DecodeError::Malformed("id"))?;
                let proposer = String::from_utf8(proposer.to_vec())
                    .map_err(|_| DecodeError::InvalidUtf8("proposer"))?;
                Proposal::Utxo {
                    id,
                    proposer,
                    body,
                    action,
                }
            }
            Chain::Contract => {
                let action = match kind {
                    ProposalKind::Signal => ContractAction::Signal,
                    ProposalKind::Spend => {
                        let recipient = evm_address(r.bytes8("recipient")?, "recipient")?;
                        let amount = Amount::new(r.u128("amount")?);
                        ContractAction::Spend { recipient, amount }
                    }
                    ProposalKind::AssetTransfer => return Err(DecodeError::UnknownKind(nibble)),
                };
                let id = match id.len() {
                    0 => None,
                    8 => {
                        let mut arr = [0u8; 8];
                        arr.copy_from_slice(id);
                        Some(u64::from_be_bytes(arr))
                    }
                    _ => return Err(DecodeError::Malformed("id")),
                };
                Proposal::Contract {
                    id,
                    proposer: evm_address(proposer, "proposer")?,
                    body,
                    action,
                }
            }
        };
        r.finish()?;
        proposal.validate()?;

        if let Proposal::Utxo { id, .. } = &proposal {
            if *id != content_id(&proposal) {
                return Err(DecodeError::IdMismatch);
            }
        }
        Ok(proposal)
    }
}

/// SHA-256 of the proposal's encoding with the id field left empty.
pub fn content_id(proposal: &Proposal) -> [u8; 32] {
    Sha256::digest(encode_with_id(proposal, false)).into()
}

fn encode_with_id(proposal: &Proposal, include_id: bool) -> Vec<u8> {
    let mut w = Writer::default();
    w.u8(PAYLOAD_VERSION);
    w.u8((proposal.chain().tag_nibble() << 4) | proposal.kind().nibble());
    match proposal.id() {
        Some(id) if include_id => w.bytes8(&id.to_bytes()),
        _ => w.bytes8(&[]),
    }
    match proposal {
        Proposal::Utxo { proposer, .. } => w.bytes8(proposer.as_bytes()),
        Proposal::Contract { proposer, .. } => w.bytes8(proposer.as_bytes()),
    }
    write_body(&mut w, proposal.body());
    match proposal {
        Proposal::Utxo { action, .. } => match action {
            UtxoAction::Signal => {}
            UtxoAction::Spend { recipient, amount } => {
                w.bytes8(recipient.as_bytes());
                w.u128(amount.raw());
            }
            UtxoAction::AssetTransfer {
                recipient_key,
                asset_id,
                amount,
            } => {
                w.bytes8(recipient_key);
                w.u128(amount.raw());
                w.raw(asset_id.as_bytes());
            }
        },
        Proposal::Contract { action, .. } => match action {
            ContractAction::Signal => {}
            ContractAction::Spend { recipient, amount } => {
                w.bytes8(recipient.as_bytes());
                w.u128(amount.raw());
            }
        },
    }
    w.into_inner()
}

fn write_body(w: &mut Writer, body: &ProposalBody) {
    w.bytes16(body.title.as_bytes());
    w.bytes16(body.description.as_bytes());
    w.u8(body.options.len() as u8);
    for option in &body.options {
        w.bytes8(option.as_bytes());
    }
    w.u64(body.start_time.as_secs());
    w.u64(body.end_time.map_or(0, |t| t.as_secs()));
}

fn read_body(r: &mut Reader<'_>) -> Result<ProposalBody, DecodeError> {
    let title = r.str16("title")?;
    let description = r.str16("description")?;
    let count = r.u8("option count")?;
    let options = (0..count)
        .map(|_| r.str8("option"))
        .collect::<Result<Vec<_>, _>>()?;
    let start_time = Timestamp::new(r.u64("start time")?);
    let end_time = match r.u64("end time")? {
        0 => None,
        secs => Some(Timestamp::new(secs)),
    };
    Ok(ProposalBody {
        title,
        description,
        options,
        start_time,
        end_time,
    })
}

fn evm_address(bytes: &[u8], field: &'static str) -> Result<EvmAddress, DecodeError> {
    let arr: [u8; 20] = bytes.try_into().map_err(|_| DecodeError::Malformed(field))?;
    Ok(EvmAddress::new(arr))
}

/// Fields whose length prefix would overflow. Reported as oversize payloads
/// since any such field already exceeds every chain limit.
fn check_field_lengths(proposal: &Proposal) -> Result<(), EncodeError> {
    let body = proposal.body();
    let too_long = body.title.len() > u16::MAX as usize
        || body.description.len() > u16::MAX as usize
        || body.options.iter().any(|o| o.len() > u8::MAX as usize)
        || proposal.proposer().len() > u8::MAX as usize
        || matches!(proposal, Proposal::Utxo { action: UtxoAction::Spend { recipient, .. }, .. } if recipient.len() > u8::MAX as usize);
    if too_long {
        let size = encoded_len_upper_bound(proposal);
        return Err(EncodeError::PayloadTooLarge {
            chain: proposal.chain(),
            size,
            limit: u16::MAX as usize,
        });
    }
    Ok(())
}

fn encoded_len_upper_bound(proposal: &Proposal) -> usize {
    let body = proposal.body();
    64 + proposal.proposer().len()
        + body.title.len()
        + body.description.len()
        + body.options.iter().map(|o| o.len() + 1).sum::<usize>()
        + 128
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_types::ValidationError;

    fn body(title: &str) -> ProposalBody {
        ProposalBody {
            title: title.into(),
            description: "Fund the relay operators".into(),
            options: vec!["Yes".into(), "No".into()],
            start_time: Timestamp::new(1_700_000_000),
            end_time: Some(Timestamp::new(1_700_604_800)),
        }
    }

    fn utxo_spend() -> Proposal {
        ProposalCodec::default()
            .new_utxo_proposal(
                "bc1qproposer",
                body("Relay grant"),
                UtxoAction::Spend {
                    recipient: "bc1qrecipient".into(),
                    amount: Amount::new(50_000),
                },
            )
            .unwrap()
    }

    #[test]
    fn utxo_proposal_roundtrips() {
        let codec = ProposalCodec::default();
        let p = utxo_spend();
        let bytes = codec.encode(&p).unwrap();
        assert_eq!(bytes[0], PAYLOAD_VERSION);
        assert_eq!(bytes[1], 0x11);
        assert_eq!(codec.decode(&bytes).unwrap(), p);
    }

    #[test]
    fn contract_draft_and_committed_roundtrip() {
        let codec = ProposalCodec::default();
        let draft = Proposal::Contract {
            id: None,
            proposer: EvmAddress::new([7u8; 20]),
            body: body("Upgrade oracle"),
            action: ContractAction::Signal,
        };
        let bytes = codec.encode(&draft).unwrap();
        assert_eq!(bytes[1], 0x20);
        assert_eq!(codec.decode(&bytes).unwrap(), draft);

        let committed = draft.with_contract_id(42);
        let bytes = codec.encode(&committed).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), committed);
    }

    #[test]
    fn ten_thousand_byte_title_is_too_large_for_utxo() {
        let codec = ProposalCodec::default();
        let p = Proposal::Utxo {
            id: [0u8; 32],
            proposer: "bc1qproposer".into(),
            body: body(&"x".repeat(10_000)),
            action: UtxoAction::Signal,
        };
        assert!(matches!(
            codec.encode(&p),
            Err(EncodeError::PayloadTooLarge { chain: Chain::Utxo, .. })
        ));
    }

    #[test]
    fn new_utxo_proposal_rejects_oversize_body() {
        let err = ProposalCodec::default()
            .new_utxo_proposal("bc1q", body(&"x".repeat(10_000)), UtxoAction::Signal)
            .unwrap_err();
        assert_eq!(err.kind(), tandem_types::ErrorKind::PayloadTooLarge);
    }

    #[test]
    fn tampered_payload_fails_id_check() {
        let codec = ProposalCodec::default();
        let mut bytes = codec.encode(&utxo_spend()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert_eq!(codec.decode(&bytes), Err(DecodeError::IdMismatch));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let codec = ProposalCodec::default();
        let mut bytes = codec.encode(&utxo_spend()).unwrap();
        bytes.push(0);
        assert_eq!(codec.decode(&bytes), Err(DecodeError::TrailingBytes(1)));
    }

    #[test]
    fn unknown_version_and_nibbles() {
        let codec = ProposalCodec::default();
        let bytes = codec.encode(&utxo_spend()).unwrap();

        let mut v = bytes.clone();
        v[0] = 9;
        assert_eq!(codec.decode(&v), Err(DecodeError::UnknownVersion(9)));

        let mut c = bytes.clone();
        c[1] = 0x31;
        assert_eq!(codec.decode(&c), Err(DecodeError::UnknownChain(3)));

        let mut k = bytes.clone();
        k[1] = 0x17;
        assert_eq!(codec.decode(&k), Err(DecodeError::UnknownKind(7)));

        let mut vote = bytes;
        vote[1] = 0x1F;
        assert_eq!(codec.decode(&vote), Err(DecodeError::NotAProposal));
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let codec = ProposalCodec::default();
        let bytes = codec.encode(&utxo_spend()).unwrap();
        assert!(matches!(
            codec.decode(&bytes[..bytes.len() / 2]),
            Err(DecodeError::Truncated(_))
        ));
    }

    #[test]
    fn invalid_proposal_is_not_encoded() {
        let mut b = body("One option");
        b.options.truncate(1);
        let p = Proposal::Contract {
            id: None,
            proposer: EvmAddress::new([1u8; 20]),
            body: b,
            action: ContractAction::Signal,
        };
        assert_eq!(
            ProposalCodec::default().encode(&p),
            Err(EncodeError::Invalid(ValidationError::TooFewOptions(1)))
        );
    }

    #[test]
    fn open_ended_proposal_roundtrips() {
        let mut b = body("No deadline");
        b.end_time = None;
        let codec = ProposalCodec::default();
        let p = codec
            .new_utxo_proposal("bc1qproposer", b, UtxoAction::Signal)
            .unwrap();
        assert_eq!(codec.decode(&codec.encode(&p).unwrap()).unwrap(), p);
    }
}
