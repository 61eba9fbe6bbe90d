//! Nullable UTXO chain: an in-memory node behind [`UtxoRpc`].
//!
//! Height 0 is an empty genesis block. Broadcast transactions wait in a
//! mempool until [`NullUtxoChain::mine`] seals them into the next block, or
//! are mined at once with auto-mining. Blocks are stamped with the attached
//! clock's time, or with zero when none is attached.

use async_trait::async_trait;
use bitcoin::absolute::LockTime;
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount as Sats, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid,
    Witness,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tandem_adapters::{BroadcastError, ChainError, UnspentOutput, UtxoBlock, UtxoRpc};
use tandem_types::{Chain, Timestamp};
use tandem_utils::Clock;

use crate::clock::NullClock;

#[derive(Debug)]
struct Coin {
    output: TxOut,
    /// Block height, `None` while in the mempool.
    height: Option<u64>,
}

#[derive(Debug, Default)]
struct State {
    blocks: Vec<UtxoBlock>,
    mempool: Vec<Transaction>,
    coins: HashMap<OutPoint, Coin>,
    broadcasts: Vec<Transaction>,
    failures: VecDeque<String>,
    offline: bool,
    auto_mine: bool,
    nonce: u32,
    clock: Option<Arc<NullClock>>,
}

impl State {
    fn tip(&self) -> u64 {
        self.blocks.len() as u64 - 1
    }

    fn apply(&mut self, tx: &Transaction, height: Option<u64>) {
        for input in &tx.input {
            self.coins.remove(&input.previous_output);
        }
        let txid = tx.compute_txid();
        for (vout, output) in tx.output.iter().enumerate() {
            self.coins.insert(
                OutPoint::new(txid, vout as u32),
                Coin {
                    output: output.clone(),
                    height,
                },
            );
        }
    }

    fn seal(&mut self, transactions: Vec<Transaction>) -> u64 {
        let height = self.blocks.len() as u64;
        for tx in &transactions {
            self.apply(tx, Some(height));
        }
        let time = self
            .clock
            .as_ref()
            .map_or(Timestamp::new(0), |clock| clock.now());
        self.blocks.push(UtxoBlock { time, transactions });
        height
    }

    fn find(&self, txid: &Txid) -> Option<&Transaction> {
        self.blocks
            .iter()
            .flat_map(|block| block.transactions.iter())
            .chain(self.mempool.iter())
            .find(|tx| tx.compute_txid() == *txid)
    }
}

#[derive(Debug)]
pub struct NullUtxoChain {
    state: Mutex<State>,
}

impl Default for NullUtxoChain {
    fn default() -> Self {
        Self::new()
    }
}

impl NullUtxoChain {
    pub fn new() -> Self {
        let state = State {
            blocks: vec![UtxoBlock {
                time: Timestamp::new(0),
                transactions: Vec::new(),
            }],
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Mine broadcast transactions immediately.
    pub fn auto_mine(self) -> Self {
        self.state.lock().unwrap().auto_mine = true;
        self
    }

    /// Stamp blocks sealed from now on with `clock`'s time.
    pub fn with_clock(self, clock: Arc<NullClock>) -> Self {
        self.state.lock().unwrap().clock = Some(clock);
        self
    }

    /// Mine a block paying `value` sats to `script_pubkey`.
    pub fn fund(&self, script_pubkey: ScriptBuf, value: u64) -> OutPoint {
        let mut state = self.state.lock().unwrap();
        state.nonce += 1;
        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig: ScriptBuf::from_bytes(state.nonce.to_le_bytes().to_vec()),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value: Sats::from_sat(value),
                script_pubkey,
            }],
        };
        let outpoint = OutPoint::new(tx.compute_txid(), 0);
        state.seal(vec![tx]);
        outpoint
    }

    /// Append a block with arbitrary transactions; returns its height.
    pub fn push_block(&self, txs: Vec<Transaction>) -> u64 {
        self.state.lock().unwrap().seal(txs)
    }

    /// Seal the mempool into a new block; returns its height.
    pub fn mine(&self) -> u64 {
        let mut state = self.state.lock().unwrap();
        let txs = std::mem::take(&mut state.mempool);
        state.seal(txs)
    }

    /// Append `count` empty blocks.
    pub fn mine_empty(&self, count: usize) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..count {
            state.seal(Vec::new());
        }
    }

    /// Reject the next broadcast with a node error message.
    pub fn fail_next_broadcast(&self, message: impl Into<String>) {
        self.state.lock().unwrap().failures.push_back(message.into());
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    /// Every transaction accepted by `send_raw_transaction`, in order.
    pub fn broadcasts(&self) -> Vec<Transaction> {
        self.state.lock().unwrap().broadcasts.clone()
    }

    pub fn mempool_len(&self) -> usize {
        self.state.lock().unwrap().mempool.len()
    }

    pub fn height(&self) -> u64 {
        self.state.lock().unwrap().tip()
    }

    fn online(&self, method: &str) -> Result<(), ChainError> {
        if self.state.lock().unwrap().offline {
            return Err(ChainError::Unavailable {
                chain: Chain::Utxo,
                method: method.to_string(),
                reason: "connection refused".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl UtxoRpc for NullUtxoChain {
    async fn block_count(&self) -> Result<u64, ChainError> {
        self.online("getblockcount")?;
        Ok(self.state.lock().unwrap().tip())
    }

    async fn block(&self, height: u64) -> Result<UtxoBlock, ChainError> {
        self.online("getblock")?;
        let state = self.state.lock().unwrap();
        usize::try_from(height)
            .ok()
            .and_then(|h| state.blocks.get(h))
            .cloned()
            .ok_or_else(|| ChainError::Rpc {
                chain: Chain::Utxo,
                method: "getblockhash".into(),
                code: -8,
                message: "Block height out of range".into(),
            })
    }

    async fn transaction(&self, txid: &Txid) -> Result<Transaction, ChainError> {
        self.online("getrawtransaction")?;
        let state = self.state.lock().unwrap();
        state.find(txid).cloned().ok_or_else(|| ChainError::Rpc {
            chain: Chain::Utxo,
            method: "getrawtransaction".into(),
            code: -5,
            message: "No such mempool or blockchain transaction".into(),
        })
    }

    async fn list_unspent(
        &self,
        address: &Address,
        min_confirmations: u32,
    ) -> Result<Vec<UnspentOutput>, ChainError> {
        self.online("listunspent")?;
        let spk = address.script_pubkey();
        let state = self.state.lock().unwrap();
        let tip = state.tip();
        let mut found: Vec<UnspentOutput> = state
            .coins
            .iter()
            .filter(|(_, coin)| coin.output.script_pubkey == spk)
            .map(|(outpoint, coin)| UnspentOutput {
                outpoint: *outpoint,
                value: coin.output.value.to_sat(),
                script_pubkey: coin.output.script_pubkey.clone(),
                confirmations: coin.height.map_or(0, |h| (tip - h + 1) as u32),
            })
            .filter(|u| u.confirmations >= min_confirmations)
            .collect();
        found.sort_by_key(|u| (u.outpoint.txid, u.outpoint.vout));
        Ok(found)
    }

    async fn send_raw_transaction(&self, tx: &Transaction) -> Result<Txid, ChainError> {
        self.online("sendrawtransaction")?;
        let mut state = self.state.lock().unwrap();
        if let Some(message) = state.failures.pop_front() {
            return Err(BroadcastError::classify(Chain::Utxo, message).into());
        }
        if tx
            .input
            .iter()
            .any(|i| !state.coins.contains_key(&i.previous_output))
        {
            return Err(
                BroadcastError::classify(Chain::Utxo, "bad-txns-inputs-missingorspent").into(),
            );
        }
        state.broadcasts.push(tx.clone());
        if state.auto_mine {
            state.seal(vec![tx.clone()]);
        } else {
            state.apply(tx, None);
            state.mempool.push(tx.clone());
        }
        Ok(tx.compute_txid())
    }
}
