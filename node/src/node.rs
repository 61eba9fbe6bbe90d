//! Wiring configured chains into the governance engine and the treasury.

use futures_util::TryStreamExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use tandem_adapters::{ChainAdapter, ContractChainAdapter, ProposalFilter, UtxoChainAdapter};
use tandem_governance::{GovernanceEngine, Tally, VoteTally};
use tandem_store::GovernanceLedger;
use tandem_treasury::{TreasuryManager, UtxoWallet};
use tandem_types::{Chain, Proposal, ProposalId};
use tandem_utils::Clock;
use tracing::info;

use crate::{NodeConfig, NodeError};

pub struct TandemNode {
    config: NodeConfig,
    adapters: BTreeMap<Chain, Arc<dyn ChainAdapter>>,
}

impl TandemNode {
    /// Build an adapter over JSON-RPC for every configured chain section.
    pub fn connect(config: NodeConfig) -> Result<Self, NodeError> {
        config.validate()?;
        let mut adapters: Vec<Arc<dyn ChainAdapter>> = Vec::new();
        if let Some(section) = config.utxo_section() {
            info!(url = %section.rpc_url, network = %section.network, "utxo chain configured");
            adapters.push(Arc::new(UtxoChainAdapter::connect(section)?));
        }
        if let Some(section) = config.contract_section() {
            info!(url = %section.rpc_url, dao = %section.dao_address, "contract chain configured");
            adapters.push(Arc::new(ContractChainAdapter::connect(section)?));
        }
        Ok(Self::with_adapters(config, adapters))
    }

    /// A node over already-built adapters.
    pub fn with_adapters(
        config: NodeConfig,
        adapters: impl IntoIterator<Item = Arc<dyn ChainAdapter>>,
    ) -> Self {
        Self {
            config,
            adapters: adapters.into_iter().map(|a| (a.chain(), a)).collect(),
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn chains(&self) -> impl Iterator<Item = Chain> + '_ {
        self.adapters.keys().copied()
    }

    pub fn adapter(&self, chain: Chain) -> Result<&Arc<dyn ChainAdapter>, NodeError> {
        self.adapters
            .get(&chain)
            .ok_or(NodeError::ChainNotConfigured(chain))
    }

    pub fn governance(
        &self,
        ledger: Arc<dyn GovernanceLedger>,
        clock: Arc<dyn Clock>,
    ) -> Result<GovernanceEngine, NodeError> {
        let engine = GovernanceEngine::new(ledger, self.config.governance.clone(), clock)?;
        Ok(self
            .adapters
            .values()
            .fold(engine, |engine, adapter| engine.with_adapter(adapter.clone())))
    }

    pub fn treasury(
        &self,
        ledger: Arc<dyn GovernanceLedger>,
        clock: Arc<dyn Clock>,
        utxo_wallet: Option<UtxoWallet>,
    ) -> Result<TreasuryManager, NodeError> {
        let mut treasury = TreasuryManager::new(ledger, self.config.treasury.clone(), clock)?;
        for adapter in self.adapters.values() {
            treasury = treasury.with_adapter(adapter.clone());
        }
        if let Some(wallet) = utxo_wallet {
            treasury = treasury.with_utxo_wallet(wallet);
        }
        Ok(treasury)
    }

    /// Every committed proposal on `chain`, read straight from the chain.
    pub async fn proposals(&self, chain: Chain) -> Result<Vec<Proposal>, NodeError> {
        let adapter = self.adapter(chain)?;
        Ok(adapter
            .fetch_proposals(ProposalFilter::default())
            .try_collect()
            .await?)
    }

    /// Look up one committed proposal by id.
    pub async fn proposal(&self, id: &ProposalId) -> Result<Proposal, NodeError> {
        let adapter = self.adapter(id.chain())?;
        let filter = match id {
            ProposalId::Contract(n) => ProposalFilter {
                start: Some(*n),
                end: Some(*n),
                ..Default::default()
            },
            ProposalId::Content(_) => ProposalFilter::default(),
        };
        let mut proposals = adapter.fetch_proposals(filter);
        while let Some(proposal) = proposals.try_next().await? {
            if proposal.id().as_ref() == Some(id) {
                return Ok(proposal);
            }
        }
        Err(NodeError::ProposalNotFound(*id))
    }

    /// Current tally of the votes committed inside the voting window,
    /// without the membership re-check applied at closing.
    pub async fn tally(&self, id: &ProposalId) -> Result<Tally, NodeError> {
        let proposal = self.proposal(id).await?;
        let window = self.config.governance.window(proposal.body());
        let set = self
            .adapter(id.chain())?
            .fetch_votes(&proposal, &window)
            .await?;
        Ok(VoteTally.tally(id, &proposal.body().options, &set.votes))
    }
}
