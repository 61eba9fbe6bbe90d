//! Unspent outputs owned by a wallet on the UTXO chain.

use crate::amount::Amount;
use crate::hash::AssetId;
use bitcoin::{OutPoint, ScriptBuf};
use serde::{Deserialize, Serialize};

/// How an output is locked, which decides its witness layout and input weight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptType {
    /// Pay-to-pubkey-hash: scriptSig with signature and public key.
    Legacy,
    /// P2WPKH nested in P2SH: redeem script in scriptSig, signature in witness.
    WrappedSegwit,
    /// Native P2WPKH: witness stack only.
    NativeSegwit,
    /// Taproot output committing to an asset leaf, spent via the script path.
    AssetCommitment,
}

impl ScriptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptType::Legacy => "legacy",
            ScriptType::WrappedSegwit => "wrapped-segwit",
            ScriptType::NativeSegwit => "native-segwit",
            ScriptType::AssetCommitment => "asset-commitment",
        }
    }
}

/// Asset units carried by an asset-commitment output, with the leaf script
/// needed to spend it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetHolding {
    pub asset_id: AssetId,
    pub amount: Amount,
    /// The committed tapscript leaf.
    pub leaf_script: ScriptBuf,
}

/// An unspent output. Consumed exactly once as a transaction input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub outpoint: OutPoint,
    /// Native value in satoshis.
    pub value: u64,
    pub script_pubkey: ScriptBuf,
    pub script_type: ScriptType,
    pub asset: Option<AssetHolding>,
}

impl Utxo {
    pub fn is_asset(&self) -> bool {
        self.asset.is_some()
    }
}
