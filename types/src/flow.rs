//! Native value moving into or out of the treasury.

use crate::amount::Amount;
use crate::chain::Chain;
use crate::hash::TxHash;
use crate::time::Timestamp;
use crate::vote::ChainPosition;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowDirection {
    Income,
    Expense,
}

impl fmt::Display for FlowDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            FlowDirection::Income => "income",
            FlowDirection::Expense => "expense",
        })
    }
}

/// One treasury transaction, netted to a single direction.
///
/// A UTXO-chain spend that returns change counts only what left the
/// treasury, fee included.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasuryFlow {
    pub chain: Chain,
    pub tx: TxHash,
    pub position: ChainPosition,
    /// Time of the block that carries the transaction.
    pub time: Timestamp,
    pub direction: FlowDirection,
    pub amount: Amount,
}

impl TreasuryFlow {
    pub fn is_income(&self) -> bool {
        self.direction == FlowDirection::Income
    }
}
