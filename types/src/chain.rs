//! The two ledgers a Tandem DAO spans.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which ledger a proposal, vote, balance, or transaction belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Chain {
    /// The unspent-output settlement chain.
    Utxo,
    /// The account/contract chain.
    Contract,
}

impl Chain {
    pub const ALL: [Chain; 2] = [Chain::Utxo, Chain::Contract];

    /// High nibble of the payload tag byte.
    pub fn tag_nibble(&self) -> u8 {
        match self {
            Chain::Utxo => 0x1,
            Chain::Contract => 0x2,
        }
    }

    pub fn from_tag_nibble(nibble: u8) -> Option<Self> {
        match nibble {
            0x1 => Some(Chain::Utxo),
            0x2 => Some(Chain::Contract),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Utxo => "utxo",
            Chain::Contract => "contract",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Chain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utxo" | "bitcoin" | "btc" => Ok(Chain::Utxo),
            "contract" | "rsk" | "evm" => Ok(Chain::Contract),
            other => Err(format!("unknown chain: {other}")),
        }
    }
}
