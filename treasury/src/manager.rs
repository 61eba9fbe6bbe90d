//! Treasury balances and proposal execution.

use crate::allocation::{allocate, AllocationPolicy};
use crate::error::TreasuryError;
use crate::statement::{ChainStatement, FinancialStatement};
use bitcoin::address::NetworkUnchecked;
use bitcoin::{Address, Network, ScriptBuf};
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tandem_adapters::{ChainAdapter, SignedTx};
use tandem_assets::{owner_key, AssetCodec};
use tandem_governance::{GovernanceError, StatusBoard};
use tandem_store::{GovernanceLedger, GovernanceStore};
use tandem_transactions::{FeeRate, OutputSpec, TransactionBuilder};
use tandem_types::{
    Allocation, Amount, BalanceSnapshot, Chain, ContractAction, ExecutionResult, Proposal,
    ProposalId, ProposalStatus, Timestamp, TreasuryFlow, TxRef, UtxoAction, ValidationError,
};
use tandem_utils::Clock;
use tandem_wallet_core::{Signer, SigningBackend};
use tracing::{debug, info, warn};

fn default_fee_rate() -> u64 {
    5
}

fn default_execution_threshold() -> u64 {
    100
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasuryConfig {
    /// Fee rate for treasury spends on the UTXO chain, in sat/vB.
    #[serde(default = "default_fee_rate")]
    pub fee_rate: u64,
    /// Membership balance a caller needs to trigger execution.
    #[serde(default = "default_execution_threshold")]
    pub execution_threshold: u64,
    #[serde(default)]
    pub policy: AllocationPolicy,
}

impl Default for TreasuryConfig {
    fn default() -> Self {
        Self {
            fee_rate: default_fee_rate(),
            execution_threshold: default_execution_threshold(),
            policy: AllocationPolicy::default(),
        }
    }
}

impl TreasuryConfig {
    pub fn execution_threshold(&self) -> Amount {
        Amount::from(self.execution_threshold)
    }
}

/// The key that controls the treasury's UTXO-chain funds.
pub struct UtxoWallet {
    /// Change and asset remainders return here.
    pub address: Address,
    pub network: Network,
    pub backend: Arc<dyn SigningBackend>,
}

/// Per-chain treasury balances with the policy split of each native total.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasuryReport {
    pub balances: BTreeMap<Chain, BalanceSnapshot>,
    pub allocations: BTreeMap<Chain, Allocation>,
}

/// What a successful chain action produced.
struct Effect {
    tx: Option<TxRef>,
    fee: Option<Amount>,
}

pub struct TreasuryManager {
    adapters: BTreeMap<Chain, Arc<dyn ChainAdapter>>,
    store: GovernanceStore,
    board: StatusBoard,
    config: TreasuryConfig,
    clock: Arc<dyn Clock>,
    builder: TransactionBuilder,
    signer: Signer,
    assets: AssetCodec,
    utxo_wallet: Option<UtxoWallet>,
}

impl TreasuryManager {
    pub fn new(
        ledger: Arc<dyn GovernanceLedger>,
        config: TreasuryConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TreasuryError> {
        config.policy.validate()?;
        Ok(Self {
            adapters: BTreeMap::new(),
            store: GovernanceStore::new(ledger.clone()),
            board: StatusBoard::new(ledger),
            config,
            clock,
            builder: TransactionBuilder::default(),
            signer: Signer::new(),
            assets: AssetCodec,
            utxo_wallet: None,
        })
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn ChainAdapter>) -> Self {
        self.adapters.insert(adapter.chain(), adapter);
        self
    }

    pub fn with_utxo_wallet(mut self, wallet: UtxoWallet) -> Self {
        self.utxo_wallet = Some(wallet);
        self
    }

    pub fn config(&self) -> &TreasuryConfig {
        &self.config
    }

    fn adapter(&self, chain: Chain) -> Result<&Arc<dyn ChainAdapter>, TreasuryError> {
        self.adapters
            .get(&chain)
            .ok_or(TreasuryError::ChainNotConfigured(chain))
    }

    /// Treasury balance on every configured chain, fetched concurrently.
    /// Snapshots are independent; no cross-chain atomicity.
    pub async fn get_total_balance(&self) -> Result<BTreeMap<Chain, BalanceSnapshot>, TreasuryError> {
        let fetches = self.adapters.iter().map(|(chain, adapter)| async move {
            let snapshot = adapter.get_balance(adapter.treasury_address()).await?;
            Ok::<_, TreasuryError>((*chain, snapshot))
        });
        Ok(try_join_all(fetches).await?.into_iter().collect())
    }

    pub fn allocate(&self, total: Amount) -> Result<Allocation, TreasuryError> {
        allocate(total, &self.config.policy)
    }

    pub async fn report(&self) -> Result<TreasuryReport, TreasuryError> {
        let balances = self.get_total_balance().await?;
        let allocations = balances
            .iter()
            .map(|(chain, snapshot)| Ok((*chain, self.allocate(snapshot.native)?)))
            .collect::<Result<_, TreasuryError>>()?;
        Ok(TreasuryReport {
            balances,
            allocations,
        })
    }

    /// Treasury income and expenses on every configured chain for block
    /// times in `[from, to)`.
    pub async fn income_and_expenses(
        &self,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<FinancialStatement, TreasuryError> {
        if from >= to {
            return Err(GovernanceError::Invalid(ValidationError::Other(format!(
                "statement period {from}..{to} is empty"
            )))
            .into());
        }
        let reads = self.adapters.iter().map(|(chain, adapter)| async move {
            let flows = adapter.treasury_flows(from, to).await?;
            Ok::<_, TreasuryError>((*chain, ChainStatement::from_flows(flows)))
        });
        let chains: BTreeMap<Chain, ChainStatement> =
            try_join_all(reads).await?.into_iter().collect();
        for (chain, statement) in &chains {
            debug!(
                %chain,
                income = %statement.income,
                expenses = %statement.expenses,
                flows = statement.flows.len(),
                "treasury statement"
            );
        }
        Ok(FinancialStatement { from, to, chains })
    }

    /// Funds received by the treasury in `[from, to)`, oldest first.
    pub async fn incoming_funds(
        &self,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<TreasuryFlow>, TreasuryError> {
        Ok(self.income_and_expenses(from, to).await?.incoming())
    }

    /// Carry out a passed proposal on behalf of `caller`, who must hold the
    /// execution threshold on the proposal's chain.
    ///
    /// The status moves `Passed → Executing` by compare-and-swap before any
    /// chain work, so at most one caller ever broadcasts. The outcome is
    /// recorded as `Executed` or `Failed`; a failure keeps its cause both in
    /// the status event and in the returned error.
    pub async fn execute(
        &self,
        caller: &str,
        id: &ProposalId,
    ) -> Result<ExecutionResult, TreasuryError> {
        let proposal = self
            .store
            .get_proposal(id)?
            .ok_or(GovernanceError::ProposalNotFound(*id))?;
        let chain = proposal.chain();
        let adapter = self.adapter(chain)?;
        if !adapter
            .is_member(caller, self.config.execution_threshold())
            .await?
        {
            warn!(proposal = %id, caller, "execution refused to a non-member");
            return Err(TreasuryError::NotAuthorized {
                chain,
                address: caller.to_string(),
            });
        }

        self.board
            .transition(
                id,
                ProposalStatus::Passed,
                ProposalStatus::Executing,
                self.clock.now(),
                None,
            )
            .map_err(|e| claim_error(*id, e))?;
        info!(proposal = %id, %chain, caller, "executing proposal");

        match self.perform(&proposal).await {
            Ok(effect) => {
                let reason = effect.tx.as_ref().map(|tx| format!("tx {tx}"));
                self.board.transition(
                    id,
                    ProposalStatus::Executing,
                    ProposalStatus::Executed,
                    self.clock.now(),
                    reason,
                )?;
                info!(proposal = %id, "proposal executed");
                Ok(ExecutionResult {
                    proposal_id: *id,
                    chain,
                    status: ProposalStatus::Executed,
                    tx: effect.tx,
                    fee: effect.fee,
                })
            }
            Err(cause) => {
                warn!(proposal = %id, error = %cause, "execution failed");
                self.board.transition(
                    id,
                    ProposalStatus::Executing,
                    ProposalStatus::Failed,
                    self.clock.now(),
                    Some(cause.to_string()),
                )?;
                Err(TreasuryError::ExecutionFailed {
                    id: *id,
                    source: Box::new(cause),
                })
            }
        }
    }

    async fn perform(&self, proposal: &Proposal) -> Result<Effect, TreasuryError> {
        match proposal {
            Proposal::Utxo { action, .. } => {
                let spec = match action {
                    UtxoAction::Signal => return Ok(Effect { tx: None, fee: None }),
                    UtxoAction::Spend { recipient, amount } => OutputSpec::Native {
                        address: self.recipient(recipient)?,
                        amount: amount
                            .to_sat()
                            .ok_or(TreasuryError::AmountOutOfRange(*amount))?,
                    },
                    UtxoAction::AssetTransfer {
                        recipient_key,
                        asset_id,
                        amount,
                    } => OutputSpec::Asset {
                        asset_id: *asset_id,
                        amount: *amount,
                        metadata: Vec::new(),
                        owner: owner_key(recipient_key)?,
                    },
                };
                self.spend_utxo(spec).await
            }
            Proposal::Contract { id, action, .. } => match (action, id) {
                (ContractAction::Signal, _) => Ok(Effect { tx: None, fee: None }),
                (ContractAction::Spend { .. }, Some(contract_id)) => {
                    let tx = self
                        .adapter(Chain::Contract)?
                        .execute_contract(*contract_id)
                        .await?;
                    Ok(Effect {
                        tx: Some(tx),
                        fee: None,
                    })
                }
                (ContractAction::Spend { .. }, None) => Err(GovernanceError::Invalid(
                    ValidationError::Other("contract proposal has no contract id".into()),
                )
                .into()),
            },
        }
    }

    fn recipient(&self, recipient: &str) -> Result<Address, TreasuryError> {
        let network = self
            .utxo_wallet
            .as_ref()
            .ok_or(TreasuryError::SignerNotConfigured(Chain::Utxo))?
            .network;
        let invalid = |reason: String| TreasuryError::InvalidRecipient {
            recipient: recipient.to_string(),
            reason,
        };
        recipient
            .parse::<Address<NetworkUnchecked>>()
            .map_err(|e| invalid(e.to_string()))?
            .require_network(network)
            .map_err(|e| invalid(e.to_string()))
    }

    async fn spend_utxo(&self, spec: OutputSpec) -> Result<Effect, TreasuryError> {
        let wallet = self
            .utxo_wallet
            .as_ref()
            .ok_or(TreasuryError::SignerNotConfigured(Chain::Utxo))?;
        let adapter = self.adapter(Chain::Utxo)?;

        let candidates = adapter.list_unspent(adapter.treasury_address()).await?;
        let unsigned = self.builder.build(
            &candidates,
            &[spec],
            FeeRate(self.config.fee_rate),
            &wallet.address,
        )?;
        let fee = Amount::from(unsigned.fee);

        // Asset remainders that come back to the treasury must stay visible.
        let (treasury_key, _) = wallet.backend.public_key().x_only_public_key();
        let owned: Vec<ScriptBuf> = unsigned
            .commitment_leaves
            .iter()
            .filter(|(_, leaf)| {
                self.assets
                    .parse_commitment(leaf)
                    .is_ok_and(|c| c.owner == treasury_key)
            })
            .map(|(_, leaf)| leaf.clone())
            .collect();
        adapter.register_commitments(&owned)?;

        let tx = self
            .signer
            .sign_transaction(unsigned, wallet.backend.clone())
            .await?;
        debug!(inputs = tx.input.len(), outputs = tx.output.len(), %fee, "treasury spend signed");
        let tx = adapter.broadcast(&SignedTx::Utxo(tx)).await?;
        Ok(Effect {
            tx: Some(tx),
            fee: Some(fee),
        })
    }
}

/// Why the `Passed → Executing` claim was refused.
fn claim_error(id: ProposalId, error: GovernanceError) -> TreasuryError {
    match error {
        GovernanceError::StatusConflict { found, .. } => match found {
            ProposalStatus::Executed => TreasuryError::AlreadyExecuted(id),
            ProposalStatus::Executing | ProposalStatus::Failed => {
                TreasuryError::ConcurrentExecution { id, found }
            }
            other => TreasuryError::NotPassed { id, found: other },
        },
        other => other.into(),
    }
}
