//! Adapter for the account/contract chain.
//!
//! Proposals are read back through `proposalCount`/`proposals(id)` calls and
//! votes through `VoteCast` logs queried in bounded block ranges. The DAO
//! contract holds the native treasury; its `Deposited` and `Executed` logs
//! are the treasury's income and expenses.
//!
//! Time windows map onto block ranges by binary search over header
//! timestamps, which the contract chain keeps monotonic.

use crate::abi::{self, DaoCall};
use crate::adapter::{ChainAdapter, ProposalFilter, ProposalStream, SignedTx, VoteSet};
use crate::config::ContractChainConfig;
use crate::error::ChainError;
use crate::eth_rpc::{ContractRpc, EthCall, EthRpcClient, LogEntry, LogFilter};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tandem_codec::{ProposalCodec, MAX_CALLDATA_PAYLOAD_BYTES};
use tandem_store::{MembershipAsset, MembershipSource};
use tandem_types::{
    Amount, Ballot, BalanceSnapshot, Chain, ChainPosition, EvmAddress, FlowDirection, Proposal,
    ProposalId, Timestamp, TreasuryFlow, TxRef, ValidationError, Vote, VoteWindow, VoteWitness,
};
use tandem_utils::StatsCounter;
use tracing::{debug, warn};

const PROPOSALS_SEEN: &str = "proposals_seen";
const VOTES_SEEN: &str = "votes_seen";
const SKIPPED_PAYLOADS: &str = "skipped_payloads";

pub struct ContractChainAdapter {
    config: ContractChainConfig,
    rpc: Arc<dyn ContractRpc>,
    dao: EvmAddress,
    sender: EvmAddress,
    membership_token: Option<EvmAddress>,
    membership: Option<Arc<dyn MembershipSource>>,
    codec: ProposalCodec,
    stats: StatsCounter,
}

fn parse_account(s: &str) -> Result<EvmAddress, ChainError> {
    s.parse().map_err(|e: tandem_types::AddressError| ChainError::InvalidAddress {
        chain: Chain::Contract,
        address: s.to_string(),
        reason: e.to_string(),
    })
}

impl ContractChainAdapter {
    pub fn new(config: ContractChainConfig, rpc: Arc<dyn ContractRpc>) -> Result<Self, ChainError> {
        let dao = parse_account(&config.dao_address)?;
        let sender = parse_account(&config.sender)?;
        parse_account(&config.treasury_address)?;
        let membership_token = config
            .membership_token
            .as_deref()
            .map(parse_account)
            .transpose()?;
        Ok(Self {
            dao,
            sender,
            membership_token,
            membership: None,
            codec: ProposalCodec::default(),
            stats: StatsCounter::new(&[PROPOSALS_SEEN, VOTES_SEEN, SKIPPED_PAYLOADS]),
            rpc,
            config,
        })
    }

    /// Adapter over an Ethereum JSON-RPC endpoint.
    pub fn connect(config: ContractChainConfig) -> Result<Self, ChainError> {
        let client = EthRpcClient::new(
            &config.rpc_url,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Self::new(config, Arc::new(client))
    }

    pub fn with_membership(mut self, source: Arc<dyn MembershipSource>) -> Self {
        self.membership = Some(source);
        self
    }

    pub fn config(&self) -> &ContractChainConfig {
        &self.config
    }

    pub fn stats(&self) -> &StatsCounter {
        &self.stats
    }

    async fn send(&self, from: EvmAddress, call: DaoCall) -> Result<TxRef, ChainError> {
        let signature = call.signature();
        let hash = self
            .rpc
            .send_transaction(EthCall {
                from,
                to: self.dao,
                data: call.encode(),
                value: Amount::ZERO,
            })
            .await?;
        debug!(call = signature, tx = %hash, "contract transaction sent");
        Ok(TxRef::new(Chain::Contract, hash))
    }

    async fn proposal_count(&self) -> Result<u64, ChainError> {
        let out = self.rpc.call(self.dao, DaoCall::ProposalCount.encode()).await?;
        Ok(abi::decode_u64(&out)?)
    }

    /// Read and decode proposal `id`; `None` when its payload is unusable.
    async fn proposal_at(&self, id: u64) -> Result<Option<Proposal>, ChainError> {
        let out = self.rpc.call(self.dao, DaoCall::Proposal { id }.encode()).await?;
        let (proposer, payload) = abi::decode_proposal_tuple(&out)?;
        let proposal = match self.codec.decode(&payload) {
            Ok(p @ Proposal::Contract { id: None, .. }) => p,
            Ok(_) => {
                self.stats.increment(SKIPPED_PAYLOADS);
                warn!(id, "stored payload is not a contract-chain draft, skipped");
                return Ok(None);
            }
            Err(e) => {
                self.stats.increment(SKIPPED_PAYLOADS);
                warn!(id, error = %e, "undecodable proposal payload skipped");
                return Ok(None);
            }
        };
        if proposal.proposer() != proposer.to_string() {
            self.stats.increment(SKIPPED_PAYLOADS);
            warn!(id, "payload proposer differs from the submitting account, skipped");
            return Ok(None);
        }
        self.stats.increment(PROPOSALS_SEEN);
        Ok(Some(proposal.with_contract_id(id)))
    }

    /// Balance of `address` at block `at`, or at the head for `None`.
    async fn balance_in(
        &self,
        address: &str,
        asset: MembershipAsset,
        at: Option<u64>,
    ) -> Result<Amount, ChainError> {
        let account = parse_account(address)?;
        match asset {
            MembershipAsset::Native => self.rpc.balance_at(account, at).await,
            MembershipAsset::Token(token) => {
                let out = self
                    .rpc
                    .call_at(token, DaoCall::BalanceOf { account }.encode(), at)
                    .await?;
                Ok(abi::decode_amount(&out)?)
            }
            MembershipAsset::Asset(_) => Err(ChainError::Unsupported {
                chain: Chain::Contract,
                operation: "utxo-chain asset balances",
            }),
        }
    }

    fn membership_asset(&self) -> MembershipAsset {
        self.membership_token
            .map_or(MembershipAsset::Native, MembershipAsset::Token)
    }

    /// First block in `[log_start_block, head + 1]` stamped at or after
    /// `at`; `head + 1` when no mined block is.
    async fn first_block_at(&self, at: Timestamp, head: u64) -> Result<u64, ChainError> {
        let (mut lo, mut hi) = (self.config.log_start_block, head.saturating_add(1));
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.rpc.block_time(mid).await? >= at {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        Ok(lo)
    }

    /// DAO logs matching `topics` in blocks `[from, to]`, fetched in
    /// `log_chunk_size` ranges.
    async fn dao_logs(
        &self,
        topics: Vec<Option<[u8; 32]>>,
        from: u64,
        to: u64,
    ) -> Result<Vec<LogEntry>, ChainError> {
        let chunk = self.config.log_chunk_size.max(1);
        let mut logs = Vec::new();
        let mut start = from;
        while start <= to {
            let end = to.min(start.saturating_add(chunk - 1));
            logs.extend(
                self.rpc
                    .logs(&LogFilter {
                        address: self.dao,
                        topics: topics.clone(),
                        from_block: start,
                        to_block: end,
                    })
                    .await?,
            );
            if end == u64::MAX {
                break;
            }
            start = end + 1;
        }
        Ok(logs)
    }
}

struct IdScan<'a> {
    adapter: &'a ContractChainAdapter,
    filter: ProposalFilter,
    next: u64,
    end: Option<u64>,
    done: bool,
}

#[async_trait]
impl ChainAdapter for ContractChainAdapter {
    fn chain(&self) -> Chain {
        Chain::Contract
    }

    fn treasury_address(&self) -> &str {
        &self.config.treasury_address
    }

    async fn submit_proposal(&self, encoded: &[u8]) -> Result<TxRef, ChainError> {
        let proposal = self.codec.decode(encoded)?;
        let Proposal::Contract {
            id: None, proposer, ..
        } = proposal
        else {
            return Err(ValidationError::Other(
                "only contract-chain drafts can be submitted to the DAO contract".into(),
            )
            .into());
        };
        if encoded.len() > MAX_CALLDATA_PAYLOAD_BYTES {
            return Err(tandem_codec::EncodeError::PayloadTooLarge {
                chain: Chain::Contract,
                size: encoded.len(),
                limit: MAX_CALLDATA_PAYLOAD_BYTES,
            }
            .into());
        }
        self.send(
            proposer,
            DaoCall::SubmitProposal {
                payload: encoded.to_vec(),
            },
        )
        .await
    }

    fn fetch_proposals(&self, filter: ProposalFilter) -> ProposalStream<'_> {
        let scan = IdScan {
            adapter: self,
            next: filter.start.unwrap_or(1).max(1),
            filter,
            end: None,
            done: false,
        };
        stream::unfold(scan, |mut s| async move {
            loop {
                if s.done {
                    return None;
                }
                let end = match s.end {
                    Some(end) => end,
                    None => match s.adapter.proposal_count().await {
                        Ok(count) => {
                            let end = s.filter.end.map_or(count, |e| e.min(count));
                            s.end = Some(end);
                            end
                        }
                        Err(e) => {
                            s.done = true;
                            return Some((Err(e), s));
                        }
                    },
                };
                if s.next > end {
                    return None;
                }
                let id = s.next;
                s.next += 1;
                match s.adapter.proposal_at(id).await {
                    Ok(Some(p)) if s.filter.matches(&p) => return Some((Ok(p), s)),
                    Ok(_) => continue,
                    Err(e) => {
                        s.done = true;
                        return Some((Err(e), s));
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
        let ProposalId::Contract(id) = *proposal_id else {
            return Err(ChainError::WrongChain(*proposal_id));
        };
        if ballot.proposal_id != *proposal_id {
            return Err(
                ValidationError::Other("ballot names a different proposal".into()).into(),
            );
        }
        if ballot.weight.is_zero() {
            return Err(ValidationError::ZeroWeight.into());
        }
        let voter = parse_account(&ballot.voter)?;
        self.send(
            voter,
            DaoCall::Vote {
                id,
                option: ballot.option_index,
                weight: ballot.weight,
            },
        )
        .await
    }

    async fn fetch_votes(
        &self,
        proposal: &Proposal,
        window: &VoteWindow,
    ) -> Result<VoteSet, ChainError> {
        let (proposal_id, id) = match proposal.id() {
            Some(pid @ ProposalId::Contract(id)) => (pid, id),
            Some(other) => return Err(ChainError::WrongChain(other)),
            None => {
                return Err(ValidationError::Other("draft proposals have no votes".into()).into())
            }
        };
        let head = self.rpc.block_number().await?;
        let first = self.first_block_at(window.opens, head).await?;
        let closing = self.first_block_at(window.closes, head).await?;
        let logs = match closing.checked_sub(1) {
            Some(last) if first <= last => {
                let topic = abi::event_topic(abi::VOTE_CAST_EVENT);
                self.dao_logs(vec![Some(topic), Some(abi::id_topic(id))], first, last)
                    .await?
            }
            _ => Vec::new(),
        };

        let mut votes = Vec::new();
        for log in logs {
            let decoded = log
                .topics
                .get(2)
                .ok_or(abi::AbiError::Malformed("VoteCast without voter topic".into()))
                .and_then(abi::address_from_topic)
                .and_then(|voter| abi::decode_vote_cast_data(&log.data).map(|(o, w)| (voter, o, w)));
            let (voter, option_index, weight) = match decoded {
                Ok(v) => v,
                Err(e) => {
                    self.stats.increment(SKIPPED_PAYLOADS);
                    warn!(proposal = %proposal_id, error = %e, "undecodable VoteCast log skipped");
                    continue;
                }
            };
            let Some(option) = proposal.body().options.get(usize::from(option_index)) else {
                self.stats.increment(SKIPPED_PAYLOADS);
                warn!(proposal = %proposal_id, index = option_index, "vote for unknown option skipped");
                continue;
            };
            self.stats.increment(VOTES_SEEN);
            votes.push(Vote {
                proposal_id,
                voter: voter.to_string(),
                option: option.clone(),
                weight,
                witness: VoteWitness {
                    tx: log.transaction_hash,
                    position: ChainPosition::new(log.block_number, log.transaction_index),
                },
            });
        }
        votes.sort_by_key(|v| v.witness.position);
        let set = VoteSet {
            votes,
            cutoff: closing.checked_sub(1),
            settled: closing <= head,
        };
        debug!(
            proposal = %proposal_id,
            votes = set.votes.len(),
            cutoff = ?set.cutoff,
            settled = set.settled,
            "votes fetched"
        );
        Ok(set)
    }

    async fn get_balance(&self, address: &str) -> Result<BalanceSnapshot, ChainError> {
        let account = parse_account(address)?;
        let native = self.rpc.balance(account).await?;
        let height = self.rpc.block_number().await?;
        Ok(BalanceSnapshot {
            chain: Chain::Contract,
            address: address.to_string(),
            native,
            assets: BTreeMap::new(),
            height: Some(height),
        })
    }

    async fn broadcast(&self, signed: &SignedTx) -> Result<TxRef, ChainError> {
        let SignedTx::Contract(raw) = signed else {
            return Err(ValidationError::Other(
                "utxo transaction sent to the contract chain".into(),
            )
            .into());
        };
        let hash = self.rpc.send_raw_transaction(raw).await?;
        debug!(tx = %hash, "transaction broadcast");
        Ok(TxRef::new(Chain::Contract, hash))
    }

    async fn is_member(&self, address: &str, minimum: Amount) -> Result<bool, ChainError> {
        self.is_member_at(address, minimum, None).await
    }

    async fn is_member_at(
        &self,
        address: &str,
        minimum: Amount,
        height: Option<u64>,
    ) -> Result<bool, ChainError> {
        let asset = self.membership_asset();
        let balance = match &self.membership {
            Some(source) => source.balance_of(address, asset).await?,
            None => self.balance_in(address, asset, height).await?,
        };
        Ok(balance >= minimum)
    }

    /// Only on-chain balances have history; a membership source answers
    /// for the present.
    fn historical_membership(&self) -> bool {
        self.membership.is_none()
    }

    async fn treasury_flows(
        &self,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<TreasuryFlow>, ChainError> {
        let head = self.rpc.block_number().await?;
        let first = self.first_block_at(from, head).await?;
        let Some(last) = self.first_block_at(to, head).await?.checked_sub(1) else {
            return Ok(Vec::new());
        };
        if first > last {
            return Ok(Vec::new());
        }
        let mut flows = Vec::new();
        let mut times = BTreeMap::new();
        for (event, direction) in [
            (abi::DEPOSITED_EVENT, FlowDirection::Income),
            (abi::EXECUTED_EVENT, FlowDirection::Expense),
        ] {
            let logs = self
                .dao_logs(vec![Some(abi::event_topic(event))], first, last)
                .await?;
            for log in logs {
                let amount = match abi::decode_amount(&log.data) {
                    Ok(amount) => amount,
                    Err(e) => {
                        self.stats.increment(SKIPPED_PAYLOADS);
                        warn!(event, tx = %log.transaction_hash, error = %e, "undecodable treasury log skipped");
                        continue;
                    }
                };
                let time = match times.get(&log.block_number) {
                    Some(time) => *time,
                    None => {
                        let time = self.rpc.block_time(log.block_number).await?;
                        times.insert(log.block_number, time);
                        time
                    }
                };
                flows.push(TreasuryFlow {
                    chain: Chain::Contract,
                    tx: log.transaction_hash,
                    position: ChainPosition::new(log.block_number, log.transaction_index),
                    time,
                    direction,
                    amount,
                });
            }
        }
        flows.sort_by_key(|f| f.position);
        debug!(flows = flows.len(), first, last, "treasury flows read");
        Ok(flows)
    }

    async fn execute_contract(&self, proposal_id: u64) -> Result<TxRef, ChainError> {
        self.send(self.sender, DaoCall::Execute { id: proposal_id })
            .await
    }

    fn skipped_payloads(&self) -> u64 {
        self.stats.get(SKIPPED_PAYLOADS)
    }
}
