//! Asset commitments attached to UTXO-chain outputs.
//!
//! A commitment is a single tapscript leaf
//!
//! ```text
//! <"TNDA"> <asset_id:32> <amount:16> <metadata> OP_2DROP OP_2DROP <owner> OP_CHECKSIG
//! ```
//!
//! committed under an unspendable internal key, so the output can only move
//! through the leaf and only with the owner's signature. The leaf is the
//! canonical form: the output script is derived from it, never parsed.

pub mod error;

pub use error::AssetError;

use bitcoin::key::XOnlyPublicKey;
use bitcoin::opcodes::all::{OP_2DROP, OP_CHECKSIG};
use bitcoin::script::{Builder, Instruction, PushBytes};
use bitcoin::secp256k1::Secp256k1;
use bitcoin::taproot::{ControlBlock, LeafVersion, TapLeafHash, TaprootBuilder, TaprootSpendInfo};
use bitcoin::{Address, Network, Script, ScriptBuf};
use tandem_types::{Amount, AssetId};

/// Marker pushed first in every commitment leaf.
pub const COMMITMENT_MAGIC: [u8; 4] = *b"TNDA";

/// Upper bound on attached metadata.
pub const MAX_METADATA_BYTES: usize = 256;

/// BIP-341 "nothing up my sleeve" point H; nobody knows its discrete log.
const NUMS_INTERNAL_KEY: [u8; 32] = [
    0x50, 0x92, 0x9b, 0x74, 0xc1, 0xa0, 0x49, 0x54, 0xb7, 0x8b, 0x4b, 0x60, 0x35, 0xe9, 0x7a, 0x5e,
    0x07, 0x8a, 0x5a, 0x0f, 0x28, 0xec, 0x96, 0xd5, 0x47, 0xbf, 0xee, 0x9a, 0xce, 0x80, 0x3a, 0xc0,
];

/// The decoded content of a commitment leaf.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetCommitment {
    pub asset_id: AssetId,
    pub amount: Amount,
    pub metadata: Vec<u8>,
    pub owner: XOnlyPublicKey,
}

/// A built commitment: the leaf plus its finalized taproot tree.
#[derive(Clone, Debug)]
pub struct CommitmentScript {
    leaf: ScriptBuf,
    spend_info: TaprootSpendInfo,
}

impl CommitmentScript {
    pub fn leaf_script(&self) -> &Script {
        &self.leaf
    }

    pub fn leaf_hash(&self) -> TapLeafHash {
        TapLeafHash::from_script(&self.leaf, LeafVersion::TapScript)
    }

    /// Output script paying to the commitment.
    pub fn script_pubkey(&self) -> ScriptBuf {
        ScriptBuf::new_p2tr_tweaked(self.spend_info.output_key())
    }

    pub fn address(&self, network: Network) -> Address {
        Address::p2tr_tweaked(self.spend_info.output_key(), network)
    }

    /// Control block proving the leaf's inclusion, for the spending witness.
    pub fn control_block(&self) -> Result<ControlBlock, AssetError> {
        self.spend_info
            .control_block(&(self.leaf.clone(), LeafVersion::TapScript))
            .ok_or_else(|| AssetError::Taproot("leaf missing from tree".into()))
    }
}

/// Builds and parses commitment leaves. Stateless.
#[derive(Clone, Copy, Debug, Default)]
pub struct AssetCodec;

impl AssetCodec {
    pub fn build_commitment(
        &self,
        asset_id: AssetId,
        amount: Amount,
        metadata: &[u8],
        owner: XOnlyPublicKey,
    ) -> Result<CommitmentScript, AssetError> {
        if amount.is_zero() {
            return Err(AssetError::ZeroAmount);
        }
        if metadata.len() > MAX_METADATA_BYTES {
            return Err(AssetError::MetadataTooLarge(metadata.len()));
        }
        // Tapscript requires minimal pushes; these single bytes have their own opcodes.
        if let [byte @ (0x01..=0x10 | 0x81)] = metadata {
            return Err(AssetError::NonMinimalMetadata(*byte));
        }
        let amount_bytes = amount.raw().to_be_bytes();
        let leaf = Builder::new()
            .push_slice(push(&COMMITMENT_MAGIC)?)
            .push_slice(push(asset_id.as_bytes())?)
            .push_slice(push(&amount_bytes)?)
            .push_slice(push(metadata)?)
            .push_opcode(OP_2DROP)
            .push_opcode(OP_2DROP)
            .push_x_only_key(&owner)
            .push_opcode(OP_CHECKSIG)
            .into_script();
        self.from_leaf(leaf)
    }

    /// Decode a commitment leaf. Anything else is `NotACommitment`.
    pub fn parse_commitment(&self, script: &Script) -> Result<AssetCommitment, AssetError> {
        let instructions = script
            .instructions()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| AssetError::NotACommitment("script"))?;
        let [
            Instruction::PushBytes(magic),
            Instruction::PushBytes(asset_id),
            Instruction::PushBytes(amount),
            Instruction::PushBytes(metadata),
            Instruction::Op(drop_a),
            Instruction::Op(drop_b),
            Instruction::PushBytes(owner),
            Instruction::Op(checksig),
        ] = instructions.as_slice()
        else {
            return Err(AssetError::NotACommitment("layout"));
        };

        if magic.as_bytes() != COMMITMENT_MAGIC {
            return Err(AssetError::NotACommitment("magic"));
        }
        if *drop_a != OP_2DROP || *drop_b != OP_2DROP || *checksig != OP_CHECKSIG {
            return Err(AssetError::NotACommitment("opcodes"));
        }
        let asset_id: [u8; 32] = asset_id
            .as_bytes()
            .try_into()
            .map_err(|_| AssetError::NotACommitment("asset id"))?;
        let amount: [u8; 16] = amount
            .as_bytes()
            .try_into()
            .map_err(|_| AssetError::NotACommitment("amount"))?;
        let metadata = metadata.as_bytes().to_vec();
        if metadata.len() > MAX_METADATA_BYTES
            || matches!(metadata.as_slice(), [0x01..=0x10 | 0x81])
        {
            return Err(AssetError::NotACommitment("metadata"));
        }
        let owner = XOnlyPublicKey::from_slice(owner.as_bytes())
            .map_err(|_| AssetError::NotACommitment("owner key"))?;

        let amount = Amount::new(u128::from_be_bytes(amount));
        if amount.is_zero() {
            return Err(AssetError::NotACommitment("amount"));
        }
        Ok(AssetCommitment {
            asset_id: AssetId::new(asset_id),
            amount,
            metadata,
            owner,
        })
    }

    /// Rebuild the taproot tree around an existing leaf, e.g. to spend it.
    pub fn from_leaf(&self, leaf: ScriptBuf) -> Result<CommitmentScript, AssetError> {
        let secp = Secp256k1::verification_only();
        let internal = XOnlyPublicKey::from_slice(&NUMS_INTERNAL_KEY)
            .map_err(|e| AssetError::Taproot(e.to_string()))?;
        let spend_info = TaprootBuilder::new()
            .add_leaf(0, leaf.clone())
            .map_err(|e| AssetError::Taproot(e.to_string()))?
            .finalize(&secp, internal)
            .map_err(|_| AssetError::Taproot("finalize failed".into()))?;
        Ok(CommitmentScript { leaf, spend_info })
    }

    /// Whether `script_pubkey` pays to the tree built from `leaf`.
    pub fn matches_output(&self, leaf: &Script, script_pubkey: &Script) -> bool {
        self.from_leaf(leaf.to_owned())
            .is_ok_and(|c| c.script_pubkey().as_script() == script_pubkey)
    }
}

fn push(bytes: &[u8]) -> Result<&PushBytes, AssetError> {
    <&PushBytes>::try_from(bytes).map_err(|_| AssetError::MetadataTooLarge(bytes.len()))
}

/// Owner key from the raw 32-byte form carried in proposals.
pub fn owner_key(bytes: &[u8; 32]) -> Result<XOnlyPublicKey, AssetError> {
    XOnlyPublicKey::from_slice(bytes).map_err(|_| AssetError::InvalidOwnerKey)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::opcodes::all::OP_RETURN;
    use bitcoin::secp256k1::{Keypair, SecretKey};

    fn owner(seed: u8) -> XOnlyPublicKey {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[seed; 32]).unwrap();
        Keypair::from_secret_key(&secp, &sk).x_only_public_key().0
    }

    #[test]
    fn build_then_parse() {
        let codec = AssetCodec;
        let id = AssetId::new([9u8; 32]);
        let c = codec
            .build_commitment(id, Amount::new(1_000), b"grant-7", owner(1))
            .unwrap();
        let parsed = codec.parse_commitment(c.leaf_script()).unwrap();
        assert_eq!(parsed.asset_id, id);
        assert_eq!(parsed.amount, Amount::new(1_000));
        assert_eq!(parsed.metadata, b"grant-7".to_vec());
        assert_eq!(parsed.owner, owner(1));
    }

    #[test]
    fn output_is_p2tr_and_matches_leaf() {
        let codec = AssetCodec;
        let c = codec
            .build_commitment(AssetId::new([1u8; 32]), Amount::new(5), &[], owner(2))
            .unwrap();
        let spk = c.script_pubkey();
        assert!(spk.is_p2tr());
        assert!(codec.matches_output(c.leaf_script(), &spk));
        let other = codec
            .build_commitment(AssetId::new([1u8; 32]), Amount::new(6), &[], owner(2))
            .unwrap();
        assert!(!codec.matches_output(other.leaf_script(), &spk));
        assert!(c.control_block().is_ok());
    }

    #[test]
    fn plain_scripts_are_not_commitments() {
        let codec = AssetCodec;
        let op_return = Builder::new()
            .push_opcode(OP_RETURN)
            .push_slice(b"hello")
            .into_script();
        assert!(matches!(
            codec.parse_commitment(&op_return),
            Err(AssetError::NotACommitment(_))
        ));
        assert!(matches!(
            codec.parse_commitment(Script::new()),
            Err(AssetError::NotACommitment("layout"))
        ));
    }

    #[test]
    fn trailing_opcodes_are_rejected() {
        let codec = AssetCodec;
        let c = codec
            .build_commitment(AssetId::new([3u8; 32]), Amount::new(1), &[], owner(3))
            .unwrap();
        let mut bytes = c.leaf_script().to_bytes();
        bytes.push(OP_2DROP.to_u8());
        assert_eq!(
            codec.parse_commitment(&ScriptBuf::from_bytes(bytes)),
            Err(AssetError::NotACommitment("layout"))
        );
    }

    #[test]
    fn limits() {
        let codec = AssetCodec;
        let id = AssetId::new([0u8; 32]);
        assert_eq!(
            codec
                .build_commitment(id, Amount::ZERO, &[], owner(4))
                .unwrap_err(),
            AssetError::ZeroAmount
        );
        assert_eq!(
            codec
                .build_commitment(id, Amount::new(1), &[0u8; MAX_METADATA_BYTES + 1], owner(4))
                .unwrap_err(),
            AssetError::MetadataTooLarge(MAX_METADATA_BYTES + 1)
        );
    }

    #[test]
    fn single_byte_metadata_must_be_minimal() {
        let codec = AssetCodec;
        let id = AssetId::new([4u8; 32]);
        for byte in [0x01, 0x05, 0x10, 0x81] {
            assert_eq!(
                codec
                    .build_commitment(id, Amount::new(1), &[byte], owner(5))
                    .unwrap_err(),
                AssetError::NonMinimalMetadata(byte)
            );
        }
        for metadata in [&[][..], &[0x00], &[0x11], &[0x80], &[0x05, 0x05]] {
            let c = codec
                .build_commitment(id, Amount::new(1), metadata, owner(5))
                .unwrap();
            assert_eq!(
                codec.parse_commitment(c.leaf_script()).unwrap().metadata,
                metadata.to_vec()
            );
        }
    }

    #[test]
    fn non_minimal_metadata_push_is_not_a_commitment() {
        let codec = AssetCodec;
        let leaf = Builder::new()
            .push_slice(push(&COMMITMENT_MAGIC).unwrap())
            .push_slice(push(&[6u8; 32]).unwrap())
            .push_slice(push(&1u128.to_be_bytes()).unwrap())
            .push_slice(push(&[0x07]).unwrap())
            .push_opcode(OP_2DROP)
            .push_opcode(OP_2DROP)
            .push_x_only_key(&owner(6))
            .push_opcode(OP_CHECKSIG)
            .into_script();
        assert_eq!(
            codec.parse_commitment(&leaf),
            Err(AssetError::NotACommitment("metadata"))
        );
    }
}
