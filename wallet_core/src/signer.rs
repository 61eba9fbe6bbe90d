//! Input signing for the UTXO chain.
//!
//! [`Signer::sign_input`] computes the signature hash for one input according
//! to the type of output it spends and asks a [`SigningBackend`] for the
//! signature. The backend is either a local key or an external device; the
//! witness and script-sig assembly is the same for both.

use crate::error::WalletError;
use crate::keys::KeyHandle;
use async_trait::async_trait;
use bitcoin::hashes::Hash;
use bitcoin::key::CompressedPublicKey;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::secp256k1::{ecdsa, schnorr, All, Message, PublicKey, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, Prevouts, SighashCache, TapSighashType};
use bitcoin::taproot::{LeafVersion, TapLeafHash};
use bitcoin::{Amount as Sats, ScriptBuf, ScriptHash, Transaction, Witness};
use std::sync::Arc;
use tandem_assets::AssetCodec;
use tandem_transactions::{validate_unsigned, UnsignedTx};
use tandem_types::ScriptType;
use tracing::{debug, trace};

/// Signature scheme requested from a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureScheme {
    Ecdsa,
    Schnorr,
}

/// One signing request: a 32-byte digest plus context a device can display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignRequest {
    pub scheme: SignatureScheme,
    pub digest: [u8; 32],
    pub input_index: usize,
    pub script_type: ScriptType,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProducedSignature {
    Ecdsa(ecdsa::Signature),
    Schnorr(schnorr::Signature),
}

/// Produces raw signatures over digests.
#[async_trait]
pub trait SigningBackend: Send + Sync {
    fn public_key(&self) -> PublicKey;

    async fn sign(&self, request: SignRequest) -> Result<ProducedSignature, WalletError>;
}

/// Signs with a key held in memory.
pub struct LocalSigner {
    key: KeyHandle,
    secp: Secp256k1<All>,
}

impl LocalSigner {
    pub fn new(key: KeyHandle) -> Self {
        Self {
            key,
            secp: Secp256k1::new(),
        }
    }

    /// Synchronous signing, shared with device doubles.
    pub fn sign_digest(&self, request: &SignRequest) -> Result<ProducedSignature, WalletError> {
        let message = Message::from_digest(request.digest);
        match request.scheme {
            SignatureScheme::Ecdsa => {
                let sk = self.key.secret_key()?;
                Ok(ProducedSignature::Ecdsa(self.secp.sign_ecdsa(&message, &sk)))
            }
            SignatureScheme::Schnorr => {
                let keypair = self.key.keypair(&self.secp)?;
                Ok(ProducedSignature::Schnorr(
                    self.secp.sign_schnorr_no_aux_rand(&message, &keypair),
                ))
            }
        }
    }
}

#[async_trait]
impl SigningBackend for LocalSigner {
    fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }

    async fn sign(&self, request: SignRequest) -> Result<ProducedSignature, WalletError> {
        self.sign_digest(&request)
    }
}

/// Script-sig and witness for one input.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InputSignature {
    pub script_sig: ScriptBuf,
    pub witness: Witness,
}

/// Builds type-correct input signatures.
#[derive(Clone, Debug, Default)]
pub struct Signer {
    assets: AssetCodec,
}

impl Signer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sign input `index` of `unsigned.tx` as it currently stands.
    pub async fn sign_input(
        &self,
        unsigned: &UnsignedTx,
        index: usize,
        backend: &dyn SigningBackend,
    ) -> Result<InputSignature, WalletError> {
        let tx = &unsigned.tx;
        let utxo = unsigned
            .inputs
            .get(index)
            .filter(|_| index < tx.input.len())
            .ok_or(WalletError::InputOutOfRange {
                index,
                inputs: tx.input.len(),
            })?;
        let pubkey = backend.public_key();
        let compressed = CompressedPublicKey(pubkey);
        let signing = |reason: String| WalletError::Signing { index, reason };
        let mismatch = || WalletError::KeyMismatch {
            index,
            script_type: utxo.script_type,
        };
        trace!(index, script_type = utxo.script_type.as_str(), "signing input");

        match utxo.script_type {
            ScriptType::Legacy => {
                if utxo.script_pubkey != ScriptBuf::new_p2pkh(&compressed.pubkey_hash()) {
                    return Err(mismatch());
                }
                let sighash = SighashCache::new(tx)
                    .legacy_signature_hash(
                        index,
                        &utxo.script_pubkey,
                        EcdsaSighashType::All.to_u32(),
                    )
                    .map_err(|e| signing(e.to_string()))?;
                let sig = self
                    .ecdsa(backend, sighash.to_byte_array(), index, utxo.script_type)
                    .await?;
                let script_sig = Builder::new()
                    .push_slice(push_buf(sig.to_vec(), index)?)
                    .push_slice(push_buf(pubkey.serialize().to_vec(), index)?)
                    .into_script();
                Ok(InputSignature {
                    script_sig,
                    witness: Witness::new(),
                })
            }
            ScriptType::WrappedSegwit => {
                let redeem = ScriptBuf::new_p2wpkh(&compressed.wpubkey_hash());
                let wrapped = ScriptBuf::new_p2sh(&ScriptHash::hash(redeem.as_bytes()));
                if utxo.script_pubkey != wrapped {
                    return Err(mismatch());
                }
                let sighash = SighashCache::new(tx)
                    .p2wpkh_signature_hash(
                        index,
                        &redeem,
                        Sats::from_sat(utxo.value),
                        EcdsaSighashType::All,
                    )
                    .map_err(|e| signing(e.to_string()))?;
                let sig = self
                    .ecdsa(backend, sighash.to_byte_array(), index, utxo.script_type)
                    .await?;
                let script_sig = Builder::new()
                    .push_slice(push_buf(redeem.to_bytes(), index)?)
                    .into_script();
                Ok(InputSignature {
                    script_sig,
                    witness: Witness::p2wpkh(&sig, &pubkey),
                })
            }
            ScriptType::NativeSegwit => {
                if utxo.script_pubkey != ScriptBuf::new_p2wpkh(&compressed.wpubkey_hash()) {
                    return Err(mismatch());
                }
                let sighash = SighashCache::new(tx)
                    .p2wpkh_signature_hash(
                        index,
                        &utxo.script_pubkey,
                        Sats::from_sat(utxo.value),
                        EcdsaSighashType::All,
                    )
                    .map_err(|e| signing(e.to_string()))?;
                let sig = self
                    .ecdsa(backend, sighash.to_byte_array(), index, utxo.script_type)
                    .await?;
                Ok(InputSignature {
                    script_sig: ScriptBuf::new(),
                    witness: Witness::p2wpkh(&sig, &pubkey),
                })
            }
            ScriptType::AssetCommitment => {
                let asset = utxo
                    .asset
                    .as_ref()
                    .ok_or_else(|| signing("asset input without a commitment leaf".into()))?;
                let commitment = self
                    .assets
                    .parse_commitment(&asset.leaf_script)
                    .map_err(|e| signing(e.to_string()))?;
                if commitment.owner != pubkey.x_only_public_key().0 {
                    return Err(mismatch());
                }
                let tree = self
                    .assets
                    .from_leaf(asset.leaf_script.clone())
                    .map_err(|e| signing(e.to_string()))?;
                if tree.script_pubkey() != utxo.script_pubkey {
                    return Err(signing("commitment does not match the spent output".into()));
                }
                let control_block = tree.control_block().map_err(|e| signing(e.to_string()))?;

                let prevouts = unsigned.prevouts();
                let leaf_hash = TapLeafHash::from_script(&asset.leaf_script, LeafVersion::TapScript);
                let sighash = SighashCache::new(tx)
                    .taproot_script_spend_signature_hash(
                        index,
                        &Prevouts::All(&prevouts),
                        leaf_hash,
                        TapSighashType::Default,
                    )
                    .map_err(|e| signing(e.to_string()))?;
                let request = SignRequest {
                    scheme: SignatureScheme::Schnorr,
                    digest: sighash.to_byte_array(),
                    input_index: index,
                    script_type: utxo.script_type,
                };
                let signature = match backend.sign(request).await? {
                    ProducedSignature::Schnorr(sig) => sig,
                    ProducedSignature::Ecdsa(_) => {
                        return Err(signing("backend returned ECDSA for a taproot input".into()))
                    }
                };
                let sig = bitcoin::taproot::Signature {
                    signature,
                    sighash_type: TapSighashType::Default,
                };
                let mut witness = Witness::new();
                witness.push(sig.to_vec());
                witness.push(asset.leaf_script.as_bytes());
                witness.push(control_block.serialize());
                Ok(InputSignature {
                    script_sig: ScriptBuf::new(),
                    witness,
                })
            }
        }
    }

    /// Sign every input in order, applying each result before the next
    /// sighash is computed. Independent transactions may be signed
    /// concurrently; inputs of one transaction never are.
    pub async fn sign_transaction(
        &self,
        mut unsigned: UnsignedTx,
        backend: Arc<dyn SigningBackend>,
    ) -> Result<Transaction, WalletError> {
        validate_unsigned(&unsigned).map_err(|e| WalletError::Signing {
            index: 0,
            reason: e.to_string(),
        })?;
        for index in 0..unsigned.tx.input.len() {
            let signed = self.sign_input(&unsigned, index, backend.as_ref()).await?;
            let txin = &mut unsigned.tx.input[index];
            txin.script_sig = signed.script_sig;
            txin.witness = signed.witness;
        }
        debug!(
            txid = %unsigned.tx.compute_txid(),
            inputs = unsigned.tx.input.len(),
            "transaction signed"
        );
        Ok(unsigned.tx)
    }

    async fn ecdsa(
        &self,
        backend: &dyn SigningBackend,
        digest: [u8; 32],
        index: usize,
        script_type: ScriptType,
    ) -> Result<bitcoin::ecdsa::Signature, WalletError> {
        let request = SignRequest {
            scheme: SignatureScheme::Ecdsa,
            digest,
            input_index: index,
            script_type,
        };
        match backend.sign(request).await? {
            ProducedSignature::Ecdsa(signature) => Ok(bitcoin::ecdsa::Signature {
                signature,
                sighash_type: EcdsaSighashType::All,
            }),
            ProducedSignature::Schnorr(_) => Err(WalletError::Signing {
                index,
                reason: "backend returned Schnorr for an ECDSA input".into(),
            }),
        }
    }
}

fn push_buf(bytes: Vec<u8>, index: usize) -> Result<PushBytesBuf, WalletError> {
    PushBytesBuf::try_from(bytes).map_err(|e| WalletError::Signing {
        index,
        reason: e.to_string(),
    })
}
