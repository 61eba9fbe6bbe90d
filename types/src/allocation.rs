//! Allocation results: how a total splits across treasury categories.

use crate::amount::Amount;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `{category → amount}`. Always recomputed from a total and a policy; the
/// amounts sum exactly to the total they were computed from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation(BTreeMap<String, Amount>);

impl Allocation {
    pub fn new(entries: BTreeMap<String, Amount>) -> Self {
        Self(entries)
    }

    pub fn get(&self, category: &str) -> Amount {
        self.0.get(category).copied().unwrap_or(Amount::ZERO)
    }

    pub fn total(&self) -> Amount {
        self.0.values().copied().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Amount)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
