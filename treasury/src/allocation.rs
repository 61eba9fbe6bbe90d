//! Splitting a treasury total into budget categories.

use crate::error::TreasuryError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tandem_types::{Allocation, Amount};

pub const BPS: u32 = 10_000;

/// A category funded with a fixed share of the total, in basis points.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryShare {
    pub name: String,
    pub bps: u32,
}

impl CategoryShare {
    pub fn new(name: impl Into<String>, bps: u32) -> Self {
        Self {
            name: name.into(),
            bps,
        }
    }
}

/// Two floor categories plus a residual that takes whatever they leave,
/// rounding remainder included.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPolicy {
    pub primary: CategoryShare,
    pub secondary: CategoryShare,
    pub residual: String,
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        Self {
            primary: CategoryShare::new("grants", 5_000),
            secondary: CategoryShare::new("operations", 3_000),
            residual: "reserve".into(),
        }
    }
}

impl AllocationPolicy {
    pub fn validate(&self) -> Result<(), TreasuryError> {
        let names = [
            self.primary.name.as_str(),
            self.secondary.name.as_str(),
            self.residual.as_str(),
        ];
        if names.iter().any(|n| n.is_empty()) {
            return Err(TreasuryError::InvalidPolicy(
                "category names must not be empty".into(),
            ));
        }
        if names[0] == names[1] || names[0] == names[2] || names[1] == names[2] {
            return Err(TreasuryError::InvalidPolicy(
                "category names must be distinct".into(),
            ));
        }
        let floors = self.primary.bps.saturating_add(self.secondary.bps);
        if floors > BPS {
            return Err(TreasuryError::InvalidPolicy(format!(
                "floors add up to {floors} bps, more than {BPS}"
            )));
        }
        Ok(())
    }
}

/// `floor(total * bps / BPS)` without widening past u128.
fn share(total: Amount, bps: u32) -> Amount {
    let bps = u128::from(bps);
    let denom = u128::from(BPS);
    let (q, r) = (total.raw() / denom, total.raw() % denom);
    Amount::new(q * bps + r * bps / denom)
}

/// Split `total` under `policy`. The amounts always sum to `total`.
pub fn allocate(total: Amount, policy: &AllocationPolicy) -> Result<Allocation, TreasuryError> {
    policy.validate()?;
    let primary = share(total, policy.primary.bps);
    let secondary = share(total, policy.secondary.bps);
    let residual = total
        .checked_sub(primary)
        .and_then(|rest| rest.checked_sub(secondary))
        .ok_or_else(|| TreasuryError::InvalidPolicy("floors exceed the total".into()))?;

    let mut entries = BTreeMap::new();
    entries.insert(policy.primary.name.clone(), primary);
    entries.insert(policy.secondary.name.clone(), secondary);
    entries.insert(policy.residual.clone(), residual);
    Ok(Allocation::new(entries))
}
