//! Income and expense statements built from treasury flows.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tandem_types::{Amount, Chain, FlowDirection, Timestamp, TreasuryFlow};

/// One chain's treasury movements over a period.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStatement {
    pub income: Amount,
    pub expenses: Amount,
    /// In chain order.
    pub flows: Vec<TreasuryFlow>,
}

impl ChainStatement {
    pub fn from_flows(flows: Vec<TreasuryFlow>) -> Self {
        let mut statement = Self::default();
        for flow in &flows {
            match flow.direction {
                FlowDirection::Income => {
                    statement.income = statement.income.saturating_add(flow.amount)
                }
                FlowDirection::Expense => {
                    statement.expenses = statement.expenses.saturating_add(flow.amount)
                }
            }
        }
        statement.flows = flows;
        statement
    }

    /// Income minus expenses, clamped to the `i128` range.
    pub fn net(&self) -> i128 {
        let clamp = |a: Amount| i128::try_from(a.raw()).unwrap_or(i128::MAX);
        clamp(self.income).saturating_sub(clamp(self.expenses))
    }
}

/// Treasury income and expenses per chain for block times in `[from, to)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialStatement {
    pub from: Timestamp,
    pub to: Timestamp,
    pub chains: BTreeMap<Chain, ChainStatement>,
}

impl FinancialStatement {
    /// Every income flow, oldest first.
    pub fn incoming(&self) -> Vec<TreasuryFlow> {
        let mut incoming: Vec<TreasuryFlow> = self
            .chains
            .values()
            .flat_map(|s| s.flows.iter())
            .filter(|f| f.is_income())
            .cloned()
            .collect();
        incoming.sort_by_key(|f| (f.time, f.chain, f.position));
        incoming
    }
}
