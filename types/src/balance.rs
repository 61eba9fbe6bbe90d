//! Point-in-time balance reads.

use crate::amount::Amount;
use crate::chain::Chain;
use crate::hash::AssetId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Balance of one address on one chain, read for the caller's request only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub chain: Chain,
    pub address: String,
    pub native: Amount,
    pub assets: BTreeMap<AssetId, Amount>,
    /// Chain height the read was taken at, when the chain reports one.
    pub height: Option<u64>,
}

impl BalanceSnapshot {
    pub fn native_only(chain: Chain, address: impl Into<String>, native: Amount) -> Self {
        Self {
            chain,
            address: address.into(),
            native,
            assets: BTreeMap::new(),
            height: None,
        }
    }

    pub fn asset(&self, id: &AssetId) -> Amount {
        self.assets.get(id).copied().unwrap_or(Amount::ZERO)
    }
}
