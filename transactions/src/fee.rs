//! Fixed byte-cost fee model, in virtual bytes.

use bitcoin::Script;
use tandem_types::{ScriptType, Utxo};

/// Version, locktime, counts and the segwit marker.
pub const TX_OVERHEAD_VBYTES: u64 = 11;

pub const LEGACY_INPUT_VBYTES: u64 = 148;
pub const WRAPPED_SEGWIT_INPUT_VBYTES: u64 = 91;
pub const NATIVE_SEGWIT_INPUT_VBYTES: u64 = 68;

/// Outpoint, empty script sig and sequence.
const BASE_INPUT_BYTES: u64 = 41;

/// Fee rate in satoshis per virtual byte.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct FeeRate(pub u64);

impl FeeRate {
    pub const ZERO: Self = Self(0);

    pub fn sat_per_vb(&self) -> u64 {
        self.0
    }

    pub fn fee_for(&self, vbytes: u64) -> u64 {
        self.0.saturating_mul(vbytes)
    }
}

pub fn input_vbytes(utxo: &Utxo) -> u64 {
    match utxo.script_type {
        ScriptType::Legacy => LEGACY_INPUT_VBYTES,
        ScriptType::WrappedSegwit => WRAPPED_SEGWIT_INPUT_VBYTES,
        ScriptType::NativeSegwit => NATIVE_SEGWIT_INPUT_VBYTES,
        ScriptType::AssetCommitment => {
            let leaf_len = utxo
                .asset
                .as_ref()
                .map_or(0, |a| a.leaf_script.len() as u64);
            // item count, signature, leaf, single-leaf control block
            let witness = 1 + (1 + 64) + (varint_len(leaf_len) + leaf_len) + (1 + 33);
            BASE_INPUT_BYTES + witness.div_ceil(4)
        }
    }
}

pub fn output_vbytes(script_pubkey: &Script) -> u64 {
    let len = script_pubkey.len() as u64;
    8 + varint_len(len) + len
}

fn varint_len(n: u64) -> u64 {
    match n {
        0..=0xFC => 1,
        0xFD..=0xFFFF => 3,
        0x1_0000..=0xFFFF_FFFF => 5,
        _ => 9,
    }
}
