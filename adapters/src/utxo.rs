//! Adapter for the UTXO settlement chain.
//!
//! Proposals and votes travel as single-push data outputs. Reading them back
//! means scanning confirmed blocks and decoding every tagged payload; payloads
//! that fail to decode are dropped and counted.
//!
//! A vote counts only when its transaction spends an output of the address it
//! names as voter, so every voter funds their own vote transactions. Checking
//! that reads each vote's prevouts, which needs a node with `-txindex`.

use crate::adapter::{ChainAdapter, ProposalFilter, ProposalStream, SignedTx, VoteSet};
use crate::bitcoin_rpc::{BitcoinRpcClient, UnspentOutput, UtxoRpc};
use crate::config::UtxoChainConfig;
use crate::error::ChainError;
use async_trait::async_trait;
use bitcoin::address::NetworkUnchecked;
use bitcoin::hashes::Hash;
use bitcoin::script::Instruction;
use bitcoin::{Address, Network, OutPoint, Script, ScriptBuf, Transaction, Txid};
use futures_util::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tandem_assets::AssetCodec;
use tandem_codec::{
    peek_payload_type, EncodeError, PayloadLimits, PayloadType, ProposalCodec, VoteCodec,
};
use tandem_store::{MembershipAsset, MembershipSource};
use tandem_transactions::{BuilderParams, FeeRate, OutputSpec, TransactionBuilder};
use tandem_types::{
    Amount, AssetHolding, AssetId, Ballot, BalanceSnapshot, Chain, ChainPosition, FlowDirection,
    Proposal, ProposalId, ScriptType, Timestamp, TreasuryFlow, TxHash, TxRef, Utxo,
    ValidationError, Vote, VoteWindow, VoteWitness,
};
use tandem_utils::StatsCounter;
use tandem_wallet_core::{Signer, SigningBackend};
use tracing::{debug, warn};

const PROPOSALS_SEEN: &str = "proposals_seen";
const VOTES_SEEN: &str = "votes_seen";
const SKIPPED_PAYLOADS: &str = "skipped_payloads";

/// Wallet paying for payload transactions.
///
/// The adapter-wide funding wallet pays for proposals; each voter's own
/// wallet pays for their votes.
pub struct Funding {
    pub address: Address,
    pub backend: Arc<dyn SigningBackend>,
}

pub struct UtxoChainAdapter {
    config: UtxoChainConfig,
    rpc: Arc<dyn UtxoRpc>,
    proposals: ProposalCodec,
    votes: VoteCodec,
    builder: TransactionBuilder,
    signer: Signer,
    assets: AssetCodec,
    funding: Option<Funding>,
    /// Voter address → wallet.
    voters: HashMap<String, Funding>,
    membership_asset: Option<AssetId>,
    membership: Option<Arc<dyn MembershipSource>>,
    /// Commitment output script → leaf script.
    leaves: RwLock<HashMap<ScriptBuf, ScriptBuf>>,
    stats: StatsCounter,
}

/// Display-order hash of a transaction id.
pub fn txid_hash(txid: &Txid) -> TxHash {
    let mut bytes = txid.to_byte_array();
    bytes.reverse();
    TxHash::new(bytes)
}

/// The pushed bytes of a single-push data output.
pub fn data_payload(script: &Script) -> Option<&[u8]> {
    if !script.is_op_return() {
        return None;
    }
    let mut instructions = script.instructions();
    instructions.next();
    match (instructions.next(), instructions.next()) {
        (Some(Ok(Instruction::PushBytes(push))), None) => Some(push.as_bytes()),
        _ => None,
    }
}

fn parse_address(s: &str, network: Network) -> Result<Address, ChainError> {
    let invalid = |reason: String| ChainError::InvalidAddress {
        chain: Chain::Utxo,
        address: s.to_string(),
        reason,
    };
    s.parse::<Address<NetworkUnchecked>>()
        .map_err(|e| invalid(e.to_string()))?
        .require_network(network)
        .map_err(|e| invalid(e.to_string()))
}

impl UtxoChainAdapter {
    pub fn new(config: UtxoChainConfig, rpc: Arc<dyn UtxoRpc>) -> Result<Self, ChainError> {
        parse_address(&config.treasury_address, config.network)?;
        let membership_asset = config
            .membership_asset
            .as_deref()
            .map(|id| {
                id.parse::<AssetId>()
                    .map_err(|e| ValidationError::Other(format!("membership asset: {e}")))
            })
            .transpose()?;
        let limits = PayloadLimits {
            utxo: config.max_data_carrier_bytes,
            ..PayloadLimits::default()
        };
        let adapter = Self {
            proposals: ProposalCodec::new(limits),
            votes: VoteCodec::new(config.max_data_carrier_bytes),
            builder: TransactionBuilder::new(BuilderParams::default()),
            signer: Signer::new(),
            assets: AssetCodec,
            funding: None,
            voters: HashMap::new(),
            membership_asset,
            membership: None,
            leaves: RwLock::new(HashMap::new()),
            stats: StatsCounter::new(&[PROPOSALS_SEEN, VOTES_SEEN, SKIPPED_PAYLOADS]),
            rpc,
            config,
        };
        let known = adapter
            .config
            .asset_leaves
            .iter()
            .map(|leaf| {
                hex::decode(leaf).map(ScriptBuf::from_bytes).map_err(|e| {
                    ValidationError::Other(format!("asset leaf is not hex: {e}")).into()
                })
            })
            .collect::<Result<Vec<_>, ChainError>>()?;
        adapter.register_commitments(&known)?;
        Ok(adapter)
    }

    /// Adapter over a bitcoind JSON-RPC endpoint.
    pub fn connect(config: UtxoChainConfig) -> Result<Self, ChainError> {
        let mut client = BitcoinRpcClient::new(
            &config.rpc_url,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        if let (Some(user), Some(password)) = (&config.rpc_user, &config.rpc_password) {
            client = client.with_basic_auth(user, password);
        }
        if let Some(secs) = config.block_timeout_secs {
            client = client.with_block_timeout(Duration::from_secs(secs));
        }
        Self::new(config, Arc::new(client))
    }

    pub fn with_funding(mut self, funding: Funding) -> Self {
        self.funding = Some(funding);
        self
    }

    /// Let this node cast votes for `wallet.address`.
    pub fn with_voter(mut self, wallet: Funding) -> Self {
        self.voters.insert(wallet.address.to_string(), wallet);
        self
    }

    /// Answer membership from `source` instead of on-chain balances.
    pub fn with_membership(mut self, source: Arc<dyn MembershipSource>) -> Self {
        self.membership = Some(source);
        self
    }

    pub fn config(&self) -> &UtxoChainConfig {
        &self.config
    }

    pub fn stats(&self) -> &StatsCounter {
        &self.stats
    }

    fn address(&self, s: &str) -> Result<Address, ChainError> {
        parse_address(s, self.config.network)
    }

    fn commitment_addresses(&self) -> Vec<Address> {
        let leaves = self.leaves.read().unwrap_or_else(PoisonError::into_inner);
        let mut addresses: Vec<Address> = leaves
            .keys()
            .filter_map(|spk| Address::from_script(spk, self.config.network).ok())
            .collect();
        addresses.sort_by_key(|a| a.to_string());
        addresses
    }

    /// Highest height with the configured confirmation depth, if any.
    async fn confirmed_tip(&self) -> Result<Option<u64>, ChainError> {
        let count = self.rpc.block_count().await?;
        Ok((count + 1).checked_sub(u64::from(self.config.confirmations.max(1))))
    }

    fn classify(&self, unspent: UnspentOutput) -> Option<Utxo> {
        let spk = &unspent.script_pubkey;
        let (script_type, asset) = if spk.is_p2wpkh() {
            (ScriptType::NativeSegwit, None)
        } else if spk.is_p2sh() {
            (ScriptType::WrappedSegwit, None)
        } else if spk.is_p2pkh() {
            (ScriptType::Legacy, None)
        } else if spk.is_p2tr() {
            let leaf = self
                .leaves
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(spk)
                .cloned()?;
            let commitment = self.assets.parse_commitment(&leaf).ok()?;
            let holding = AssetHolding {
                asset_id: commitment.asset_id,
                amount: commitment.amount,
                leaf_script: leaf,
            };
            (ScriptType::AssetCommitment, Some(holding))
        } else {
            return None;
        };
        Some(Utxo {
            outpoint: unspent.outpoint,
            value: unspent.value,
            script_pubkey: unspent.script_pubkey,
            script_type,
            asset,
        })
    }

    fn decode_proposal(&self, payload: &[u8], height: u64) -> Option<Proposal> {
        if peek_payload_type(payload) != Some(PayloadType::Proposal) {
            return None;
        }
        match self.proposals.decode(payload) {
            Ok(proposal @ Proposal::Utxo { .. }) => {
                self.stats.increment(PROPOSALS_SEEN);
                Some(proposal)
            }
            Ok(_) => {
                self.stats.increment(SKIPPED_PAYLOADS);
                warn!(height, "contract-chain proposal found in a data output, skipped");
                None
            }
            Err(e) => {
                self.stats.increment(SKIPPED_PAYLOADS);
                warn!(height, error = %e, "undecodable proposal payload skipped");
                None
            }
        }
    }

    /// The vote in `payload`, if it is one for `proposal` with a known
    /// option and a voter address valid on this network.
    fn decode_vote(
        &self,
        payload: &[u8],
        proposal: &Proposal,
        id: &ProposalId,
        position: ChainPosition,
    ) -> Option<(Ballot, String, ScriptBuf)> {
        if peek_payload_type(payload) != Some(PayloadType::Vote) {
            return None;
        }
        let ballot = match self.votes.decode(payload) {
            Ok(ballot) => ballot,
            Err(e) => {
                self.stats.increment(SKIPPED_PAYLOADS);
                warn!(height = position.height, error = %e, "undecodable vote payload skipped");
                return None;
            }
        };
        if ballot.proposal_id != *id {
            return None;
        }
        let Some(option) = proposal.body().options.get(usize::from(ballot.option_index)) else {
            self.stats.increment(SKIPPED_PAYLOADS);
            warn!(proposal = %id, index = ballot.option_index, "vote for unknown option skipped");
            return None;
        };
        let voter = match self.address(&ballot.voter) {
            Ok(address) => address.script_pubkey(),
            Err(e) => {
                self.stats.increment(SKIPPED_PAYLOADS);
                warn!(proposal = %id, error = %e, "vote with an invalid voter address skipped");
                return None;
            }
        };
        Some((ballot, option.clone(), voter))
    }

    /// Whether `tx` spends an output locked to `voter`.
    async fn spends_from(
        &self,
        tx: &Transaction,
        voter: &Script,
        prevouts: &mut HashMap<Txid, Transaction>,
    ) -> Result<bool, ChainError> {
        for input in &tx.input {
            let outpoint = input.previous_output;
            if outpoint.is_null() {
                continue;
            }
            if !prevouts.contains_key(&outpoint.txid) {
                let previous = self.rpc.transaction(&outpoint.txid).await?;
                prevouts.insert(outpoint.txid, previous);
            }
            let spent = prevouts
                .get(&outpoint.txid)
                .and_then(|previous| previous.output.get(outpoint.vout as usize));
            if spent.is_some_and(|output| output.script_pubkey.as_script() == voter) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Script pubkeys the treasury receives at: its address plus every
    /// registered asset commitment.
    fn treasury_scripts(&self) -> Result<HashSet<ScriptBuf>, ChainError> {
        let mut scripts: HashSet<ScriptBuf> = self
            .leaves
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        scripts.insert(self.address(&self.config.treasury_address)?.script_pubkey());
        Ok(scripts)
    }

    /// Fund from `funding`, sign and broadcast a transaction carrying
    /// `payload`.
    async fn publish(&self, payload: Vec<u8>, funding: &Funding) -> Result<TxRef, ChainError> {
        let candidates: Vec<Utxo> = self
            .rpc
            .list_unspent(&funding.address, self.config.confirmations)
            .await?
            .into_iter()
            .filter_map(|u| self.classify(u))
            .filter(|u| !u.is_asset())
            .collect();
        let unsigned = self.builder.build(
            &candidates,
            &[OutputSpec::Data(payload)],
            FeeRate(self.config.payload_fee_rate),
            &funding.address,
        )?;
        let tx = self
            .signer
            .sign_transaction(unsigned, funding.backend.clone())
            .await?;
        self.broadcast(&SignedTx::Utxo(tx)).await
    }
}

struct ProposalScan<'a> {
    adapter: &'a UtxoChainAdapter,
    filter: ProposalFilter,
    next: u64,
    end: Option<u64>,
    queue: VecDeque<Proposal>,
    done: bool,
}

#[async_trait]
impl ChainAdapter for UtxoChainAdapter {
    fn chain(&self) -> Chain {
        Chain::Utxo
    }

    fn treasury_address(&self) -> &str {
        &self.config.treasury_address
    }

    async fn submit_proposal(&self, encoded: &[u8]) -> Result<TxRef, ChainError> {
        let proposal = self.proposals.decode(encoded)?;
        if proposal.chain() != Chain::Utxo {
            return Err(ValidationError::Other(
                "contract-chain proposal submitted to the utxo chain".into(),
            )
            .into());
        }
        if encoded.len() > self.config.max_data_carrier_bytes {
            return Err(EncodeError::PayloadTooLarge {
                chain: Chain::Utxo,
                size: encoded.len(),
                limit: self.config.max_data_carrier_bytes,
            }
            .into());
        }
        let funding = self.funding.as_ref().ok_or(ChainError::NotConfigured {
            chain: Chain::Utxo,
            what: "funding wallet",
        })?;
        let tx = self.publish(encoded.to_vec(), funding).await?;
        debug!(tx = %tx, bytes = encoded.len(), "proposal payload broadcast");
        Ok(tx)
    }

    fn fetch_proposals(&self, filter: ProposalFilter) -> ProposalStream<'_> {
        let scan = ProposalScan {
            adapter: self,
            next: filter.start.unwrap_or(self.config.scan_start_height),
            filter,
            end: None,
            queue: VecDeque::new(),
            done: false,
        };
        stream::unfold(scan, |mut s| async move {
            loop {
                if let Some(proposal) = s.queue.pop_front() {
                    return Some((Ok(proposal), s));
                }
                if s.done {
                    return None;
                }
                let end = match s.end {
                    Some(end) => end,
                    None => match s.adapter.confirmed_tip().await {
                        Ok(Some(tip)) => {
                            let end = s.filter.end.map_or(tip, |e| e.min(tip));
                            s.end = Some(end);
                            end
                        }
                        Ok(None) => return None,
                        Err(e) => {
                            s.done = true;
                            return Some((Err(e), s));
                        }
                    },
                };
                if s.next > end {
                    return None;
                }
                let height = s.next;
                s.next += 1;
                let txs = match s.adapter.rpc.block(height).await {
                    Ok(block) => block.transactions,
                    Err(e) => {
                        s.done = true;
                        return Some((Err(e), s));
                    }
                };
                for output in txs.iter().flat_map(|tx| tx.output.iter()) {
                    let Some(payload) = data_payload(&output.script_pubkey) else {
                        continue;
                    };
                    if let Some(proposal) = s.adapter.decode_proposal(payload, height) {
                        if s.filter.matches(&proposal) {
                            s.queue.push_back(proposal);
                        }
                    }
                }
            }
        })
        .boxed()
    }

    async fn cast_vote(
        &self,
        proposal_id: &ProposalId,
        ballot: &Ballot,
    ) -> Result<TxRef, ChainError> {
        if proposal_id.chain() != Chain::Utxo {
            return Err(ChainError::WrongChain(*proposal_id));
        }
        if ballot.proposal_id != *proposal_id {
            return Err(
                ValidationError::Other("ballot names a different proposal".into()).into(),
            );
        }
        let voter = self.address(&ballot.voter)?.to_string();
        let wallet = self.voters.get(&voter).ok_or_else(|| ChainError::NotAuthorized {
            chain: Chain::Utxo,
            address: voter.clone(),
        })?;
        let payload = self.votes.encode(ballot)?;
        let tx = self.publish(payload, wallet).await?;
        debug!(proposal = %proposal_id, tx = %tx, "vote payload broadcast");
        Ok(tx)
    }

    async fn fetch_votes(
        &self,
        proposal: &Proposal,
        window: &VoteWindow,
    ) -> Result<VoteSet, ChainError> {
        let id = match proposal.id() {
            Some(id @ ProposalId::Content(_)) => id,
            Some(other) => return Err(ChainError::WrongChain(other)),
            None => {
                return Err(ValidationError::Other("draft proposals have no votes".into()).into())
            }
        };
        let mut set = VoteSet::default();
        let Some(end) = self.confirmed_tip().await? else {
            return Ok(set);
        };
        let mut prevouts = HashMap::new();
        for height in self.config.scan_start_height..=end {
            let block = self.rpc.block(height).await?;
            if block.time >= window.closes {
                set.settled = true;
                break;
            }
            set.cutoff = Some(height);
            if block.time < window.opens {
                continue;
            }
            for (index, tx) in block.transactions.iter().enumerate() {
                let position = ChainPosition::new(height, index as u32);
                for output in &tx.output {
                    let Some(payload) = data_payload(&output.script_pubkey) else {
                        continue;
                    };
                    let Some((ballot, option, voter)) =
                        self.decode_vote(payload, proposal, &id, position)
                    else {
                        continue;
                    };
                    if !self.spends_from(tx, &voter, &mut prevouts).await? {
                        self.stats.increment(SKIPPED_PAYLOADS);
                        warn!(
                            proposal = %id,
                            voter = %ballot.voter,
                            height,
                            "vote not funded by its voter skipped"
                        );
                        continue;
                    }
                    self.stats.increment(VOTES_SEEN);
                    set.votes.push(Vote {
                        proposal_id: ballot.proposal_id,
                        voter: ballot.voter,
                        option,
                        weight: ballot.weight,
                        witness: VoteWitness {
                            tx: txid_hash(&tx.compute_txid()),
                            position,
                        },
                    });
                }
            }
        }
        debug!(
            proposal = %id,
            votes = set.votes.len(),
            cutoff = ?set.cutoff,
            settled = set.settled,
            "votes fetched"
        );
        Ok(set)
    }

    async fn get_balance(&self, address: &str) -> Result<BalanceSnapshot, ChainError> {
        let utxos = self.list_unspent(address).await?;
        let height = self.rpc.block_count().await?;
        let mut native = Amount::ZERO;
        let mut assets: BTreeMap<AssetId, Amount> = BTreeMap::new();
        for utxo in &utxos {
            match &utxo.asset {
                Some(holding) => {
                    let entry = assets.entry(holding.asset_id).or_default();
                    *entry = entry.saturating_add(holding.amount);
                }
                None => native = native.saturating_add(Amount::from(utxo.value)),
            }
        }
        Ok(BalanceSnapshot {
            chain: Chain::Utxo,
            address: address.to_string(),
            native,
            assets,
            height: Some(height),
        })
    }

    async fn broadcast(&self, signed: &SignedTx) -> Result<TxRef, ChainError> {
        let SignedTx::Utxo(tx) = signed else {
            return Err(
                ValidationError::Other("contract transaction sent to the utxo chain".into())
                    .into(),
            );
        };
        let txid = self.rpc.send_raw_transaction(tx).await?;
        debug!(%txid, "transaction broadcast");
        Ok(TxRef::new(Chain::Utxo, txid_hash(&txid)))
    }

    async fn is_member(&self, address: &str, minimum: Amount) -> Result<bool, ChainError> {
        let balance = match &self.membership {
            Some(source) => {
                let asset = self
                    .membership_asset
                    .map_or(MembershipAsset::Native, MembershipAsset::Asset);
                source.balance_of(address, asset).await?
            }
            None => {
                let snapshot = self.get_balance(address).await?;
                match &self.membership_asset {
                    Some(id) => snapshot.asset(id),
                    None => snapshot.native,
                }
            }
        };
        Ok(balance >= minimum)
    }

    /// Replays the chain from `scan_start_height`, following outputs paid
    /// to the treasury. Funds received before that height are unknown, so
    /// spending them reads as income of the change.
    async fn treasury_flows(
        &self,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<TreasuryFlow>, ChainError> {
        let scripts = self.treasury_scripts()?;
        let Some(end) = self.confirmed_tip().await? else {
            return Ok(Vec::new());
        };
        let mut owned: HashMap<OutPoint, u64> = HashMap::new();
        let mut flows = Vec::new();
        for height in self.config.scan_start_height..=end {
            let block = self.rpc.block(height).await?;
            for (index, tx) in block.transactions.iter().enumerate() {
                let spent: u64 = tx
                    .input
                    .iter()
                    .filter_map(|input| owned.remove(&input.previous_output))
                    .sum();
                let txid = tx.compute_txid();
                let mut received = 0u64;
                for (vout, output) in tx.output.iter().enumerate() {
                    if scripts.contains(&output.script_pubkey) {
                        let value = output.value.to_sat();
                        owned.insert(OutPoint::new(txid, vout as u32), value);
                        received += value;
                    }
                }
                let (direction, amount) = if spent > 0 {
                    (FlowDirection::Expense, spent.saturating_sub(received))
                } else {
                    (FlowDirection::Income, received)
                };
                if amount == 0 || block.time < from || block.time >= to {
                    continue;
                }
                flows.push(TreasuryFlow {
                    chain: Chain::Utxo,
                    tx: txid_hash(&txid),
                    position: ChainPosition::new(height, index as u32),
                    time: block.time,
                    direction,
                    amount: Amount::from(amount),
                });
            }
        }
        debug!(flows = flows.len(), end, "treasury flows read");
        Ok(flows)
    }

    async fn list_unspent(&self, address: &str) -> Result<Vec<Utxo>, ChainError> {
        let mut addresses = vec![self.address(address)?];
        // Registered commitments sit at their own taproot addresses.
        if address == self.config.treasury_address {
            addresses.extend(self.commitment_addresses());
        }
        let mut utxos = Vec::new();
        for address in &addresses {
            let unspent = self
                .rpc
                .list_unspent(address, self.config.confirmations)
                .await?;
            utxos.extend(unspent.into_iter().filter_map(|u| self.classify(u)));
        }
        Ok(utxos)
    }

    fn register_commitments(&self, leaves: &[ScriptBuf]) -> Result<(), ChainError> {
        let mut known = self.leaves.write().unwrap_or_else(PoisonError::into_inner);
        for leaf in leaves {
            self.assets.parse_commitment(leaf)?;
            let commitment = self.assets.from_leaf(leaf.clone())?;
            known.insert(commitment.script_pubkey(), leaf.clone());
        }
        Ok(())
    }

    fn skipped_payloads(&self) -> u64 {
        self.stats.get(SKIPPED_PAYLOADS)
    }
}
