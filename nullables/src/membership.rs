//! Nullable membership source: balances set by the test.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tandem_store::{MembershipAsset, MembershipSource, StoreError};
use tandem_types::Amount;

#[derive(Debug, Default)]
pub struct NullMembership {
    balances: Mutex<HashMap<(String, MembershipAsset), Amount>>,
    unavailable: Mutex<bool>,
}

impl NullMembership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, address: &str, asset: MembershipAsset, amount: Amount) {
        self.balances
            .lock()
            .unwrap()
            .insert((address.to_string(), asset), amount);
    }

    /// Make lookups fail as if the source were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }
}

#[async_trait]
impl MembershipSource for NullMembership {
    async fn balance_of(
        &self,
        address: &str,
        asset: MembershipAsset,
    ) -> Result<Amount, StoreError> {
        if *self.unavailable.lock().unwrap() {
            return Err(StoreError::Unavailable("null membership offline".into()));
        }
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&(address.to_string(), asset))
            .copied()
            .unwrap_or(Amount::ZERO))
    }
}
