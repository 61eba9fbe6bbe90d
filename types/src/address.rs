//! Contract-chain account address.
//!
//! UTXO-chain addresses stay in their string form (validated by the adapter
//! against its configured network); contract-chain addresses are fixed
//! 20-byte account identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address must be 0x followed by 40 hex characters: {0}")]
    Malformed(String),
}

/// A 20-byte account address on the contract chain.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EvmAddress([u8; 20]);

impl EvmAddress {
    pub const ZERO: Self = Self([0u8; 20]);

    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Debug for EvmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EvmAddress({})", self)
    }
}

impl fmt::Display for EvmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for EvmAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| AddressError::Malformed(s.to_string()))?;
        let mut arr = [0u8; 20];
        hex::decode_to_slice(body, &mut arr)
            .map_err(|_| AddressError::Malformed(s.to_string()))?;
        Ok(Self(arr))
    }
}
