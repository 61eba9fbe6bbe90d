//! UTXO-chain node access.

use crate::error::{BroadcastError, ChainError};
use crate::rpc::{JsonRpcClient, RpcDialect};
use async_trait::async_trait;
use bitcoin::{Address, Amount as Sats, OutPoint, ScriptBuf, Transaction, Txid};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tandem_types::{Chain, Timestamp};

/// An unspent output as reported by the node, before script classification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnspentOutput {
    pub outpoint: OutPoint,
    pub value: u64,
    pub script_pubkey: ScriptBuf,
    pub confirmations: u32,
}

/// A block's header time and its transactions in block order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UtxoBlock {
    pub time: Timestamp,
    pub transactions: Vec<Transaction>,
}

/// What the UTXO adapter needs from a node.
#[async_trait]
pub trait UtxoRpc: Send + Sync {
    async fn block_count(&self) -> Result<u64, ChainError>;

    async fn block(&self, height: u64) -> Result<UtxoBlock, ChainError>;

    /// A mined or pending transaction by id. bitcoind answers for
    /// transactions outside its wallet only with `-txindex`.
    async fn transaction(&self, txid: &Txid) -> Result<Transaction, ChainError>;

    async fn list_unspent(
        &self,
        address: &Address,
        min_confirmations: u32,
    ) -> Result<Vec<UnspentOutput>, ChainError>;

    async fn send_raw_transaction(&self, tx: &Transaction) -> Result<Txid, ChainError>;
}

/// bitcoind JSON-RPC client.
#[derive(Debug)]
pub struct BitcoinRpcClient {
    rpc: JsonRpcClient,
    /// Overrides the client timeout for verbose `getblock` reads.
    block_timeout: Option<Duration>,
}

#[derive(Deserialize)]
struct RawBlock {
    time: u64,
    tx: Vec<RawBlockTx>,
}

#[derive(Deserialize)]
struct RawBlockTx {
    hex: String,
}

#[derive(Deserialize)]
struct ListUnspentEntry {
    txid: String,
    vout: u32,
    amount: f64,
    #[serde(rename = "scriptPubKey")]
    script_pubkey: String,
    confirmations: u32,
}

impl BitcoinRpcClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ChainError> {
        Ok(Self {
            rpc: JsonRpcClient::new(Chain::Utxo, url, RpcDialect::Bitcoind, timeout)?,
            block_timeout: None,
        })
    }

    pub fn with_basic_auth(self, user: &str, password: &str) -> Self {
        Self {
            rpc: self.rpc.with_basic_auth(user, password),
            ..self
        }
    }

    pub fn with_block_timeout(mut self, timeout: Duration) -> Self {
        self.block_timeout = Some(timeout);
        self
    }
}

fn decode_tx(method: &str, raw: &str) -> Result<Transaction, ChainError> {
    let bytes = hex::decode(raw).map_err(|e| bad(method, e))?;
    bitcoin::consensus::deserialize(&bytes).map_err(|e| bad(method, e))
}

fn bad(method: &str, reason: impl std::fmt::Display) -> ChainError {
    ChainError::invalid_response(Chain::Utxo, method, reason)
}

#[async_trait]
impl UtxoRpc for BitcoinRpcClient {
    async fn block_count(&self) -> Result<u64, ChainError> {
        self.rpc.call("getblockcount", json!([])).await
    }

    async fn block(&self, height: u64) -> Result<UtxoBlock, ChainError> {
        let hash: String = self.rpc.call("getblockhash", json!([height])).await?;
        let block: RawBlock = self
            .rpc
            .call_with_timeout("getblock", json!([hash, 2]), self.block_timeout)
            .await?;
        Ok(UtxoBlock {
            time: Timestamp::new(block.time),
            transactions: block
                .tx
                .iter()
                .map(|raw| decode_tx("getblock", &raw.hex))
                .collect::<Result<_, _>>()?,
        })
    }

    async fn transaction(&self, txid: &Txid) -> Result<Transaction, ChainError> {
        let raw: String = self
            .rpc
            .call("getrawtransaction", json!([txid.to_string(), false]))
            .await?;
        decode_tx("getrawtransaction", &raw)
    }

    async fn list_unspent(
        &self,
        address: &Address,
        min_confirmations: u32,
    ) -> Result<Vec<UnspentOutput>, ChainError> {
        let entries: Vec<ListUnspentEntry> = self
            .rpc
            .call(
                "listunspent",
                json!([min_confirmations, 9_999_999, [address.to_string()]]),
            )
            .await?;
        entries
            .into_iter()
            .map(|e| {
                let txid: Txid = e.txid.parse().map_err(|e| bad("listunspent", e))?;
                let value = Sats::from_btc(e.amount).map_err(|e| bad("listunspent", e))?;
                let script = hex::decode(&e.script_pubkey).map_err(|e| bad("listunspent", e))?;
                Ok(UnspentOutput {
                    outpoint: OutPoint::new(txid, e.vout),
                    value: value.to_sat(),
                    script_pubkey: ScriptBuf::from_bytes(script),
                    confirmations: e.confirmations,
                })
            })
            .collect()
    }

    async fn send_raw_transaction(&self, tx: &Transaction) -> Result<Txid, ChainError> {
        let raw = bitcoin::consensus::encode::serialize_hex(tx);
        let txid: String = match self.rpc.call("sendrawtransaction", json!([raw])).await {
            Ok(txid) => txid,
            Err(ChainError::Rpc { message, .. }) => {
                return Err(BroadcastError::classify(Chain::Utxo, message).into())
            }
            Err(other) => return Err(other),
        };
        txid.parse().map_err(|e| bad("sendrawtransaction", e))
    }
}
