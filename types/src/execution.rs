//! Result of executing a passed proposal.

use crate::chain::Chain;
use crate::hash::TxRef;
use crate::proposal::ProposalId;
use crate::status::ProposalStatus;
use crate::amount::Amount;
use serde::{Deserialize, Serialize};

/// Read-only view of a completed execution, consumed by wallet UIs and CLIs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub proposal_id: ProposalId,
    pub chain: Chain,
    pub status: ProposalStatus,
    /// The broadcast transaction, absent for signal proposals.
    pub tx: Option<TxRef>,
    /// Fee paid on the UTXO chain, when a transaction was built there.
    pub fee: Option<Amount>,
}
