//! Call data and event layout of the DAO contract.
//!
//! ```text
//! submitProposal(bytes payload)
//! proposalCount() returns (uint256)
//! proposals(uint256 id) returns (address proposer, bytes payload)
//! vote(uint256 id, uint8 option, uint256 weight)
//! execute(uint256 id)
//! event VoteCast(uint256 indexed id, address indexed voter, uint8 option, uint256 weight)
//! event Deposited(address indexed from, uint256 amount)
//! event Executed(uint256 indexed id, address indexed recipient, uint256 amount)
//! ```
//!
//! Proposal ids are assigned by the contract starting at 1.

use ethers_core::abi::{self, ParamType, Token};
use ethers_core::types::{H160, U256};
use ethers_core::utils::keccak256;
use tandem_types::{Amount, EvmAddress};
use thiserror::Error;

pub const SUBMIT_PROPOSAL: &str = "submitProposal(bytes)";
pub const PROPOSAL_COUNT: &str = "proposalCount()";
pub const PROPOSALS: &str = "proposals(uint256)";
pub const VOTE: &str = "vote(uint256,uint8,uint256)";
pub const EXECUTE: &str = "execute(uint256)";
/// ERC-20 balance query, used for token-gated membership.
pub const BALANCE_OF: &str = "balanceOf(address)";
pub const VOTE_CAST_EVENT: &str = "VoteCast(uint256,address,uint8,uint256)";
/// Native value received by the treasury.
pub const DEPOSITED_EVENT: &str = "Deposited(address,uint256)";
/// Native value paid out by `execute`.
pub const EXECUTED_EVENT: &str = "Executed(uint256,address,uint256)";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AbiError {
    #[error("unknown function selector 0x{}", hex::encode(.0))]
    UnknownSelector([u8; 4]),

    #[error("malformed abi data: {0}")]
    Malformed(String),

    #[error("{0} does not fit its target width")]
    OutOfRange(&'static str),
}

impl From<abi::Error> for AbiError {
    fn from(e: abi::Error) -> Self {
        AbiError::Malformed(e.to_string())
    }
}

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

pub fn event_topic(signature: &str) -> [u8; 32] {
    keccak256(signature.as_bytes())
}

/// A call into the DAO contract (or a membership token).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DaoCall {
    SubmitProposal { payload: Vec<u8> },
    ProposalCount,
    Proposal { id: u64 },
    Vote { id: u64, option: u8, weight: Amount },
    Execute { id: u64 },
    BalanceOf { account: EvmAddress },
}

impl DaoCall {
    pub fn signature(&self) -> &'static str {
        match self {
            DaoCall::SubmitProposal { .. } => SUBMIT_PROPOSAL,
            DaoCall::ProposalCount => PROPOSAL_COUNT,
            DaoCall::Proposal { .. } => PROPOSALS,
            DaoCall::Vote { .. } => VOTE,
            DaoCall::Execute { .. } => EXECUTE,
            DaoCall::BalanceOf { .. } => BALANCE_OF,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let tokens = match self {
            DaoCall::SubmitProposal { payload } => vec![Token::Bytes(payload.clone())],
            DaoCall::ProposalCount => Vec::new(),
            DaoCall::Proposal { id } | DaoCall::Execute { id } => {
                vec![Token::Uint(U256::from(*id))]
            }
            DaoCall::Vote { id, option, weight } => vec![
                Token::Uint(U256::from(*id)),
                Token::Uint(U256::from(*option)),
                Token::Uint(U256::from(weight.raw())),
            ],
            DaoCall::BalanceOf { account } => vec![Token::Address(to_h160(account))],
        };
        let mut data = selector(self.signature()).to_vec();
        data.extend(abi::encode(&tokens));
        data
    }

    pub fn decode(data: &[u8]) -> Result<Self, AbiError> {
        if data.len() < 4 {
            return Err(AbiError::Malformed("call data shorter than a selector".into()));
        }
        let (head, args) = data.split_at(4);
        let sel = [head[0], head[1], head[2], head[3]];
        if sel == selector(SUBMIT_PROPOSAL) {
            let mut tokens = abi::decode(&[ParamType::Bytes], args)?.into_iter();
            Ok(DaoCall::SubmitProposal {
                payload: next_bytes(&mut tokens)?,
            })
        } else if sel == selector(PROPOSAL_COUNT) {
            Ok(DaoCall::ProposalCount)
        } else if sel == selector(PROPOSALS) {
            Ok(DaoCall::Proposal {
                id: decode_u64(args)?,
            })
        } else if sel == selector(EXECUTE) {
            Ok(DaoCall::Execute {
                id: decode_u64(args)?,
            })
        } else if sel == selector(VOTE) {
            let mut tokens = abi::decode(
                &[ParamType::Uint(256), ParamType::Uint(8), ParamType::Uint(256)],
                args,
            )?
            .into_iter();
            let id = u64_of(next_uint(&mut tokens)?, "proposal id")?;
            let option = u8_of(next_uint(&mut tokens)?)?;
            let weight = amount_of(next_uint(&mut tokens)?)?;
            Ok(DaoCall::Vote { id, option, weight })
        } else if sel == selector(BALANCE_OF) {
            let mut tokens = abi::decode(&[ParamType::Address], args)?.into_iter();
            match tokens.next() {
                Some(Token::Address(a)) => Ok(DaoCall::BalanceOf {
                    account: from_h160(a),
                }),
                _ => Err(AbiError::Malformed("expected address".into())),
            }
        } else {
            Err(AbiError::UnknownSelector(sel))
        }
    }
}

pub fn encode_u256(value: u128) -> Vec<u8> {
    abi::encode(&[Token::Uint(U256::from(value))])
}

pub fn decode_u64(data: &[u8]) -> Result<u64, AbiError> {
    let mut tokens = abi::decode(&[ParamType::Uint(256)], data)?.into_iter();
    u64_of(next_uint(&mut tokens)?, "uint256")
}

pub fn decode_amount(data: &[u8]) -> Result<Amount, AbiError> {
    let mut tokens = abi::decode(&[ParamType::Uint(256)], data)?.into_iter();
    amount_of(next_uint(&mut tokens)?)
}

/// Return data of `proposals(id)`.
pub fn encode_proposal_tuple(proposer: &EvmAddress, payload: &[u8]) -> Vec<u8> {
    abi::encode(&[Token::Address(to_h160(proposer)), Token::Bytes(payload.to_vec())])
}

pub fn decode_proposal_tuple(data: &[u8]) -> Result<(EvmAddress, Vec<u8>), AbiError> {
    let mut tokens = abi::decode(&[ParamType::Address, ParamType::Bytes], data)?.into_iter();
    let proposer = match tokens.next() {
        Some(Token::Address(a)) => from_h160(a),
        _ => return Err(AbiError::Malformed("expected proposer address".into())),
    };
    Ok((proposer, next_bytes(&mut tokens)?))
}

/// Indexed topic form of a proposal id.
pub fn id_topic(id: u64) -> [u8; 32] {
    let mut topic = [0u8; 32];
    topic[24..].copy_from_slice(&id.to_be_bytes());
    topic
}

/// Indexed topic form of an address.
pub fn address_topic(address: &EvmAddress) -> [u8; 32] {
    let mut topic = [0u8; 32];
    topic[12..].copy_from_slice(address.as_bytes());
    topic
}

pub fn address_from_topic(topic: &[u8; 32]) -> Result<EvmAddress, AbiError> {
    if topic[..12].iter().any(|b| *b != 0) {
        return Err(AbiError::OutOfRange("address topic"));
    }
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&topic[12..]);
    Ok(EvmAddress::new(bytes))
}

/// Non-indexed data of a `VoteCast` log.
pub fn encode_vote_cast_data(option: u8, weight: Amount) -> Vec<u8> {
    abi::encode(&[
        Token::Uint(U256::from(option)),
        Token::Uint(U256::from(weight.raw())),
    ])
}

pub fn decode_vote_cast_data(data: &[u8]) -> Result<(u8, Amount), AbiError> {
    let mut tokens =
        abi::decode(&[ParamType::Uint(8), ParamType::Uint(256)], data)?.into_iter();
    let option = u8_of(next_uint(&mut tokens)?)?;
    let weight = amount_of(next_uint(&mut tokens)?)?;
    Ok((option, weight))
}

/// Non-indexed data of `Deposited` and `Executed` logs.
pub fn encode_amount_data(amount: Amount) -> Vec<u8> {
    encode_u256(amount.raw())
}

fn to_h160(address: &EvmAddress) -> H160 {
    H160::from(*address.as_bytes())
}

fn from_h160(address: H160) -> EvmAddress {
    EvmAddress::new(address.0)
}

fn next_uint(tokens: &mut impl Iterator<Item = Token>) -> Result<U256, AbiError> {
    match tokens.next() {
        Some(Token::Uint(v)) => Ok(v),
        _ => Err(AbiError::Malformed("expected uint".into())),
    }
}

fn next_bytes(tokens: &mut impl Iterator<Item = Token>) -> Result<Vec<u8>, AbiError> {
    match tokens.next() {
        Some(Token::Bytes(b)) => Ok(b),
        _ => Err(AbiError::Malformed("expected bytes".into())),
    }
}

fn u64_of(v: U256, what: &'static str) -> Result<u64, AbiError> {
    if v.bits() > 64 {
        return Err(AbiError::OutOfRange(what));
    }
    Ok(v.low_u64())
}

fn u8_of(v: U256) -> Result<u8, AbiError> {
    if v.bits() > 8 {
        return Err(AbiError::OutOfRange("option index"));
    }
    Ok(v.low_u64() as u8)
}

fn amount_of(v: U256) -> Result<Amount, AbiError> {
    if v.bits() > 128 {
        return Err(AbiError::OutOfRange("amount"));
    }
    Ok(Amount::new(v.low_u128()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_selectors() {
        // balanceOf(address) is the well-known ERC-20 selector.
        assert_eq!(selector(BALANCE_OF), [0x70, 0xa0, 0x82, 0x31]);
    }

    #[test]
    fn calls_decode_back() {
        let account: EvmAddress = "0x00112233445566778899aabbccddeeff00112233".parse().unwrap();
        let calls = [
            DaoCall::SubmitProposal {
                payload: vec![1, 0x20, 0, 3, 4],
            },
            DaoCall::ProposalCount,
            DaoCall::Proposal { id: 9 },
            DaoCall::Vote {
                id: 3,
                option: 1,
                weight: Amount::new(u128::MAX),
            },
            DaoCall::Execute { id: 3 },
            DaoCall::BalanceOf { account },
        ];
        for call in calls {
            assert_eq!(DaoCall::decode(&call.encode()).unwrap(), call);
        }
    }

    #[test]
    fn unknown_selector_rejected() {
        assert_eq!(
            DaoCall::decode(&[0xde, 0xad, 0xbe, 0xef]),
            Err(AbiError::UnknownSelector([0xde, 0xad, 0xbe, 0xef]))
        );
    }

    #[test]
    fn oversized_uint_rejected() {
        let data = abi::encode(&[Token::Uint(U256::MAX)]);
        assert_eq!(decode_u64(&data), Err(AbiError::OutOfRange("uint256")));
        assert_eq!(decode_amount(&data), Err(AbiError::OutOfRange("amount")));
    }

    #[test]
    fn topics_carry_ids_and_addresses() {
        let voter: EvmAddress = "0xaabbccddeeff00112233445566778899aabbccdd".parse().unwrap();
        assert_eq!(address_from_topic(&address_topic(&voter)).unwrap(), voter);
        assert_eq!(id_topic(258)[30..], [1, 2]);
    }

    #[test]
    fn flow_events_carry_a_single_amount() {
        let data = encode_amount_data(Amount::new(7_500));
        assert_eq!(data.len(), 32);
        assert_eq!(decode_amount(&data).unwrap(), Amount::new(7_500));
        assert_ne!(event_topic(DEPOSITED_EVENT), event_topic(EXECUTED_EVENT));
    }
}
