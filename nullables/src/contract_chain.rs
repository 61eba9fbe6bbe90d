//! Nullable contract chain: a simulated DAO contract behind [`ContractRpc`].
//!
//! Calls are decoded with the same ABI the adapter encodes with, so a
//! mismatch between the two shows up as a revert. Native funds of the DAO
//! sit at the contract address; `execute` pays spend proposals out of them.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tandem_adapters::abi::{self, DaoCall};
use tandem_adapters::{BroadcastError, ChainError, ContractRpc, EthCall, LogEntry, LogFilter};
use tandem_codec::ProposalCodec;
use tandem_types::{Amount, Chain, ContractAction, EvmAddress, Proposal, Timestamp, TxHash};
use tandem_utils::Clock;

use crate::clock::NullClock;

/// Balance changes of one account, oldest first, keyed by the block they
/// took effect in.
type History = Vec<(u64, Amount)>;

fn balance_at(history: Option<&History>, at: Option<u64>) -> Amount {
    let Some(history) = history else {
        return Amount::ZERO;
    };
    let entry = match at {
        Some(block) => history.iter().rev().find(|(b, _)| *b <= block),
        None => history.last(),
    };
    entry.map_or(Amount::ZERO, |(_, amount)| *amount)
}

fn record(history: &mut History, block: u64, amount: Amount) {
    match history.last_mut() {
        Some((b, last)) if *b == block => *last = amount,
        _ => history.push((block, amount)),
    }
}

#[derive(Debug, Default)]
struct State {
    proposals: Vec<(EvmAddress, Vec<u8>)>,
    logs: Vec<LogEntry>,
    balances: HashMap<EvmAddress, History>,
    token_balances: HashMap<(EvmAddress, EvmAddress), History>,
    executed: Vec<u64>,
    raw_broadcasts: Vec<Vec<u8>>,
    failures: VecDeque<String>,
    offline: bool,
    /// Last sealed block.
    block: u64,
    block_times: BTreeMap<u64, Timestamp>,
    /// Transactions in the open block when mining is manual.
    pending: u32,
    manual_mining: bool,
    nonce: u64,
    clock: Option<Arc<NullClock>>,
}

impl State {
    fn seal(&mut self) {
        self.block += 1;
        let time = self
            .clock
            .as_ref()
            .map_or(Timestamp::new(0), |clock| clock.now());
        self.block_times.insert(self.block, time);
    }

    /// Position of the next transaction.
    fn next_position(&mut self) -> (u64, u32, TxHash) {
        self.nonce += 1;
        let mut hash = [0u8; 32];
        hash[24..].copy_from_slice(&self.nonce.to_be_bytes());
        let position = if self.manual_mining {
            let index = self.pending;
            self.pending += 1;
            (self.block + 1, index)
        } else {
            self.seal();
            (self.block, 0)
        };
        (position.0, position.1, TxHash::new(hash))
    }

    /// Block that state changes made now belong to.
    fn current_block(&self) -> u64 {
        if self.manual_mining && self.pending > 0 {
            self.block + 1
        } else {
            self.block
        }
    }

    fn balance(&self, account: &EvmAddress) -> Amount {
        balance_at(self.balances.get(account), None)
    }

    fn set_balance(&mut self, account: EvmAddress, amount: Amount) {
        let block = self.current_block();
        record(self.balances.entry(account).or_default(), block, amount);
    }
}

fn revert(method: &str, reason: impl std::fmt::Display) -> ChainError {
    ChainError::Rpc {
        chain: Chain::Contract,
        method: method.to_string(),
        code: 3,
        message: format!("execution reverted: {reason}"),
    }
}

#[derive(Debug)]
pub struct NullContractChain {
    dao: EvmAddress,
    state: Mutex<State>,
}

impl NullContractChain {
    pub fn new(dao: EvmAddress) -> Self {
        Self {
            dao,
            state: Mutex::new(State::default()),
        }
    }

    /// Keep transactions in one open block until [`Self::mine`].
    pub fn manual_mining(self) -> Self {
        self.state.lock().unwrap().manual_mining = true;
        self
    }

    /// Stamp blocks sealed from now on with `clock`'s time.
    pub fn with_clock(self, clock: Arc<NullClock>) -> Self {
        self.state.lock().unwrap().clock = Some(clock);
        self
    }

    /// Seal the open block.
    pub fn mine(&self) {
        let mut state = self.state.lock().unwrap();
        if state.pending > 0 {
            state.seal();
            state.pending = 0;
        }
    }

    /// Seal a block whether or not it holds transactions.
    pub fn mine_empty(&self) {
        let mut state = self.state.lock().unwrap();
        state.seal();
        state.pending = 0;
    }

    /// Set the native balance of `account` from the current block on.
    pub fn set_balance(&self, account: EvmAddress, amount: Amount) {
        self.state.lock().unwrap().set_balance(account, amount);
    }

    pub fn set_token_balance(&self, token: EvmAddress, account: EvmAddress, amount: Amount) {
        let mut state = self.state.lock().unwrap();
        let block = state.current_block();
        record(
            state.token_balances.entry((token, account)).or_default(),
            block,
            amount,
        );
    }

    /// Store a proposal payload directly, as if `proposer` had submitted it.
    pub fn store_proposal(&self, proposer: EvmAddress, payload: Vec<u8>) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.next_position();
        state.proposals.push((proposer, payload));
        state.proposals.len() as u64
    }

    /// Append a raw log, as if emitted by the DAO.
    pub fn push_log(&self, topics: Vec<[u8; 32]>, data: Vec<u8>) {
        let mut state = self.state.lock().unwrap();
        let (block_number, transaction_index, transaction_hash) = state.next_position();
        state.logs.push(LogEntry {
            address: self.dao,
            topics,
            data,
            block_number,
            transaction_index,
            transaction_hash,
        });
    }

    /// Send `amount` of native value from `from` to the DAO.
    pub fn deposit(&self, from: EvmAddress, amount: Amount) -> TxHash {
        let mut state = self.state.lock().unwrap();
        let (block_number, transaction_index, transaction_hash) = state.next_position();
        let funds = state.balance(&self.dao).saturating_add(amount);
        state.set_balance(self.dao, funds);
        state.logs.push(LogEntry {
            address: self.dao,
            topics: vec![
                abi::event_topic(abi::DEPOSITED_EVENT),
                abi::address_topic(&from),
            ],
            data: abi::encode_amount_data(amount),
            block_number,
            transaction_index,
            transaction_hash,
        });
        transaction_hash
    }

    /// Proposal ids passed to `execute`, in call order.
    pub fn executed(&self) -> Vec<u64> {
        self.state.lock().unwrap().executed.clone()
    }

    pub fn raw_broadcasts(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().raw_broadcasts.clone()
    }

    pub fn proposal_count(&self) -> u64 {
        self.state.lock().unwrap().proposals.len() as u64
    }

    /// Reject the next transaction with a node error message.
    pub fn fail_next_transaction(&self, message: impl Into<String>) {
        self.state.lock().unwrap().failures.push_back(message.into());
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    fn online(&self, method: &str) -> Result<(), ChainError> {
        if self.state.lock().unwrap().offline {
            return Err(ChainError::Unavailable {
                chain: Chain::Contract,
                method: method.to_string(),
                reason: "connection refused".into(),
            });
        }
        Ok(())
    }

    fn take_failure(state: &mut State) -> Result<(), ChainError> {
        match state.failures.pop_front() {
            Some(message) => Err(BroadcastError::classify(Chain::Contract, message).into()),
            None => Ok(()),
        }
    }

    /// Pay out a stored spend proposal; signals and unreadable payloads
    /// move no funds.
    fn pay_out(&self, state: &mut State, id: u64, position: (u64, u32, TxHash)) {
        let payout = usize::try_from(id - 1)
            .ok()
            .and_then(|i| state.proposals.get(i))
            .and_then(|(_, payload)| ProposalCodec::default().decode(payload).ok());
        let Some(Proposal::Contract {
            action: ContractAction::Spend { recipient, amount },
            ..
        }) = payout
        else {
            return;
        };
        let funds = state.balance(&self.dao).saturating_sub(amount);
        state.set_balance(self.dao, funds);
        let received = state.balance(&recipient).saturating_add(amount);
        state.set_balance(recipient, received);
        let (block_number, transaction_index, transaction_hash) = position;
        state.logs.push(LogEntry {
            address: self.dao,
            topics: vec![
                abi::event_topic(abi::EXECUTED_EVENT),
                abi::id_topic(id),
                abi::address_topic(&recipient),
            ],
            data: abi::encode_amount_data(amount),
            block_number,
            transaction_index,
            transaction_hash,
        });
    }
}

#[async_trait]
impl ContractRpc for NullContractChain {
    async fn call_at(
        &self,
        to: EvmAddress,
        data: Vec<u8>,
        at: Option<u64>,
    ) -> Result<Vec<u8>, ChainError> {
        self.online("eth_call")?;
        let call = DaoCall::decode(&data).map_err(|e| revert("eth_call", e))?;
        let state = self.state.lock().unwrap();
        match call {
            DaoCall::ProposalCount if to == self.dao => {
                Ok(abi::encode_u256(state.proposals.len() as u128))
            }
            DaoCall::Proposal { id } if to == self.dao => id
                .checked_sub(1)
                .and_then(|i| usize::try_from(i).ok())
                .and_then(|i| state.proposals.get(i))
                .map(|(proposer, payload)| abi::encode_proposal_tuple(proposer, payload))
                .ok_or_else(|| revert("eth_call", format!("no proposal {id}"))),
            DaoCall::BalanceOf { account } if to != self.dao => Ok(abi::encode_u256(
                balance_at(state.token_balances.get(&(to, account)), at).raw(),
            )),
            other => Err(revert("eth_call", format!("{} not callable", other.signature()))),
        }
    }

    async fn send_transaction(&self, tx: EthCall) -> Result<TxHash, ChainError> {
        self.online("eth_sendTransaction")?;
        let method = "eth_sendTransaction";
        if tx.to != self.dao {
            return Err(revert(method, "not the dao contract"));
        }
        let call = DaoCall::decode(&tx.data).map_err(|e| revert(method, e))?;
        let mut state = self.state.lock().unwrap();
        Self::take_failure(&mut state)?;
        let count = state.proposals.len() as u64;
        let known = |id: u64| (1..=count).contains(&id);
        match call {
            DaoCall::SubmitProposal { payload } => {
                let (_, _, hash) = state.next_position();
                state.proposals.push((tx.from, payload));
                Ok(hash)
            }
            DaoCall::Vote { id, option, weight } => {
                if !known(id) {
                    return Err(revert(method, format!("no proposal {id}")));
                }
                let (block_number, transaction_index, transaction_hash) = state.next_position();
                state.logs.push(LogEntry {
                    address: self.dao,
                    topics: vec![
                        abi::event_topic(abi::VOTE_CAST_EVENT),
                        abi::id_topic(id),
                        abi::address_topic(&tx.from),
                    ],
                    data: abi::encode_vote_cast_data(option, weight),
                    block_number,
                    transaction_index,
                    transaction_hash,
                });
                Ok(transaction_hash)
            }
            DaoCall::Execute { id } => {
                if !known(id) {
                    return Err(revert(method, format!("no proposal {id}")));
                }
                if state.executed.contains(&id) {
                    return Err(revert(method, "already executed"));
                }
                let position = state.next_position();
                state.executed.push(id);
                self.pay_out(&mut state, id, position);
                Ok(position.2)
            }
            other => Err(revert(method, format!("{} is a view", other.signature()))),
        }
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash, ChainError> {
        self.online("eth_sendRawTransaction")?;
        let mut state = self.state.lock().unwrap();
        Self::take_failure(&mut state)?;
        let (_, _, hash) = state.next_position();
        state.raw_broadcasts.push(raw.to_vec());
        Ok(hash)
    }

    async fn balance_at(
        &self,
        address: EvmAddress,
        at: Option<u64>,
    ) -> Result<Amount, ChainError> {
        self.online("eth_getBalance")?;
        let state = self.state.lock().unwrap();
        Ok(balance_at(state.balances.get(&address), at))
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, ChainError> {
        self.online("eth_getLogs")?;
        let state = self.state.lock().unwrap();
        Ok(state
            .logs
            .iter()
            .filter(|log| log.address == filter.address)
            .filter(|log| log.block_number <= state.block)
            .filter(|log| (filter.from_block..=filter.to_block).contains(&log.block_number))
            .filter(|log| {
                filter.topics.iter().enumerate().all(|(i, wanted)| match wanted {
                    Some(t) => log.topics.get(i) == Some(t),
                    None => true,
                })
            })
            .cloned()
            .collect())
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        self.online("eth_blockNumber")?;
        Ok(self.state.lock().unwrap().block)
    }

    async fn block_time(&self, number: u64) -> Result<Timestamp, ChainError> {
        self.online("eth_getBlockByNumber")?;
        let state = self.state.lock().unwrap();
        if number > state.block {
            return Err(ChainError::InvalidResponse {
                chain: Chain::Contract,
                method: "eth_getBlockByNumber".into(),
                reason: format!("no block {number}"),
            });
        }
        Ok(state
            .block_times
            .get(&number)
            .copied()
            .unwrap_or(Timestamp::new(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_types::ProposalBody;

    fn dao() -> EvmAddress {
        EvmAddress::new([0xda; 20])
    }

    #[tokio::test]
    async fn submitted_payloads_are_readable() {
        let chain = NullContractChain::new(dao());
        let alice = EvmAddress::new([0xa1; 20]);
        chain
            .send_transaction(EthCall {
                from: alice,
                to: dao(),
                data: DaoCall::SubmitProposal {
                    payload: vec![1, 2, 3],
                }
                .encode(),
                value: Amount::ZERO,
            })
            .await
            .unwrap();
        let count = chain.call(dao(), DaoCall::ProposalCount.encode()).await.unwrap();
        assert_eq!(abi::decode_u64(&count).unwrap(), 1);
        let tuple = chain
            .call(dao(), DaoCall::Proposal { id: 1 }.encode())
            .await
            .unwrap();
        assert_eq!(
            abi::decode_proposal_tuple(&tuple).unwrap(),
            (alice, vec![1, 2, 3])
        );
        assert!(chain
            .call(dao(), DaoCall::Proposal { id: 2 }.encode())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn manual_mining_shares_a_block() {
        let chain = NullContractChain::new(dao()).manual_mining();
        chain.store_proposal(EvmAddress::new([1; 20]), vec![0]);
        chain.mine();
        for voter in [2u8, 3] {
            chain
                .send_transaction(EthCall {
                    from: EvmAddress::new([voter; 20]),
                    to: dao(),
                    data: DaoCall::Vote {
                        id: 1,
                        option: 0,
                        weight: Amount::new(1),
                    }
                    .encode(),
                    value: Amount::ZERO,
                })
                .await
                .unwrap();
        }
        chain.mine();
        let logs = chain
            .logs(&LogFilter {
                address: dao(),
                topics: vec![None, Some(abi::id_topic(1))],
                from_block: 0,
                to_block: chain.block_number().await.unwrap(),
            })
            .await
            .unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].block_number, logs[1].block_number);
        assert_eq!((logs[0].transaction_index, logs[1].transaction_index), (0, 1));
    }

    #[tokio::test]
    async fn execute_twice_reverts() {
        let chain = NullContractChain::new(dao());
        chain.store_proposal(EvmAddress::new([1; 20]), vec![0]);
        let execute = || EthCall {
            from: EvmAddress::new([9; 20]),
            to: dao(),
            data: DaoCall::Execute { id: 1 }.encode(),
            value: Amount::ZERO,
        };
        chain.send_transaction(execute()).await.unwrap();
        assert!(chain.send_transaction(execute()).await.is_err());
        assert_eq!(chain.executed(), vec![1]);
    }

    #[tokio::test]
    async fn balances_keep_their_history() {
        let chain = NullContractChain::new(dao());
        let holder = EvmAddress::new([4; 20]);
        chain.set_balance(holder, Amount::new(10));
        chain.mine_empty();
        chain.mine_empty();
        chain.set_balance(holder, Amount::new(3));
        assert_eq!(chain.balance_at(holder, Some(0)).await.unwrap(), Amount::new(10));
        assert_eq!(chain.balance_at(holder, Some(1)).await.unwrap(), Amount::new(10));
        assert_eq!(chain.balance_at(holder, Some(2)).await.unwrap(), Amount::new(3));
        assert_eq!(chain.balance(holder).await.unwrap(), Amount::new(3));
    }

    #[tokio::test]
    async fn spends_pay_out_and_log_on_execute() {
        let clock = Arc::new(NullClock::new(500));
        let chain = NullContractChain::new(dao()).with_clock(clock.clone());
        let recipient = EvmAddress::new([0xbe; 20]);
        chain.deposit(EvmAddress::new([0xd0; 20]), Amount::new(1_000));
        let spend = Proposal::Contract {
            id: None,
            proposer: EvmAddress::new([1; 20]),
            body: ProposalBody {
                title: "pay".into(),
                description: String::new(),
                options: vec!["Yes".into(), "No".into()],
                start_time: Timestamp::new(0),
                end_time: None,
            },
            action: ContractAction::Spend {
                recipient,
                amount: Amount::new(400),
            },
        };
        let payload = ProposalCodec::default().encode(&spend).unwrap();
        let id = chain.store_proposal(EvmAddress::new([1; 20]), payload);
        clock.advance(60);
        chain
            .send_transaction(EthCall {
                from: EvmAddress::new([9; 20]),
                to: dao(),
                data: DaoCall::Execute { id }.encode(),
                value: Amount::ZERO,
            })
            .await
            .unwrap();

        assert_eq!(chain.balance(dao()).await.unwrap(), Amount::new(600));
        assert_eq!(chain.balance(recipient).await.unwrap(), Amount::new(400));
        let head = chain.block_number().await.unwrap();
        assert_eq!(chain.block_time(head).await.unwrap(), Timestamp::new(560));
        assert_eq!(chain.block_time(1).await.unwrap(), Timestamp::new(500));
        assert!(chain.block_time(head + 1).await.is_err());
        let executed = chain
            .logs(&LogFilter {
                address: dao(),
                topics: vec![Some(abi::event_topic(abi::EXECUTED_EVENT))],
                from_block: 0,
                to_block: head,
            })
            .await
            .unwrap();
        assert_eq!(executed.len(), 1);
        assert_eq!(abi::decode_amount(&executed[0].data).unwrap(), Amount::new(400));
    }
}
