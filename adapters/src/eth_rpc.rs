//! Contract-chain node access.

use crate::error::{BroadcastError, ChainError};
use crate::rpc::{JsonRpcClient, RpcDialect};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tandem_types::{Amount, Chain, EvmAddress, Timestamp, TxHash};

/// A transaction sent from a node-managed account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EthCall {
    pub from: EvmAddress,
    pub to: EvmAddress,
    pub data: Vec<u8>,
    pub value: Amount,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogFilter {
    pub address: EvmAddress,
    /// Positional topic constraints; `None` matches anything.
    pub topics: Vec<Option<[u8; 32]>>,
    pub from_block: u64,
    pub to_block: u64,
}

/// A mined log entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub address: EvmAddress,
    pub topics: Vec<[u8; 32]>,
    pub data: Vec<u8>,
    pub block_number: u64,
    pub transaction_index: u32,
    pub transaction_hash: TxHash,
}

/// What the contract adapter needs from a node.
///
/// `at` selects the block state is read from; `None` is the latest block.
#[async_trait]
pub trait ContractRpc: Send + Sync {
    /// Read-only call.
    async fn call_at(
        &self,
        to: EvmAddress,
        data: Vec<u8>,
        at: Option<u64>,
    ) -> Result<Vec<u8>, ChainError>;

    async fn call(&self, to: EvmAddress, data: Vec<u8>) -> Result<Vec<u8>, ChainError> {
        self.call_at(to, data, None).await
    }

    async fn send_transaction(&self, tx: EthCall) -> Result<TxHash, ChainError>;

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash, ChainError>;

    async fn balance_at(&self, address: EvmAddress, at: Option<u64>)
        -> Result<Amount, ChainError>;

    async fn balance(&self, address: EvmAddress) -> Result<Amount, ChainError> {
        self.balance_at(address, None).await
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, ChainError>;

    async fn block_number(&self) -> Result<u64, ChainError>;

    /// Header timestamp of block `number`.
    async fn block_time(&self, number: u64) -> Result<Timestamp, ChainError>;
}

/// Ethereum JSON-RPC 2.0 client.
#[derive(Debug)]
pub struct EthRpcClient {
    rpc: JsonRpcClient,
}

impl EthRpcClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ChainError> {
        Ok(Self {
            rpc: JsonRpcClient::new(Chain::Contract, url, RpcDialect::Ethereum, timeout)?,
        })
    }

    async fn submit(&self, method: &str, params: Value) -> Result<TxHash, ChainError> {
        let hash: String = match self.rpc.call(method, params).await {
            Ok(hash) => hash,
            Err(ChainError::Rpc { message, .. }) => {
                return Err(BroadcastError::classify(Chain::Contract, message).into())
            }
            Err(other) => return Err(other),
        };
        hash.parse().map_err(|e| bad(method, e))
    }
}

#[derive(Deserialize)]
struct RawHeader {
    timestamp: String,
}

fn block_tag(at: Option<u64>) -> String {
    at.map_or_else(|| "latest".to_string(), |n| quantity(u128::from(n)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLog {
    address: String,
    topics: Vec<String>,
    data: String,
    block_number: Option<String>,
    transaction_index: Option<String>,
    transaction_hash: Option<String>,
    #[serde(default)]
    removed: bool,
}

fn bad(method: &str, reason: impl std::fmt::Display) -> ChainError {
    ChainError::invalid_response(Chain::Contract, method, reason)
}

pub(crate) fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub(crate) fn from_hex(s: &str) -> Result<Vec<u8>, String> {
    hex::decode(s.strip_prefix("0x").unwrap_or(s)).map_err(|e| e.to_string())
}

pub(crate) fn quantity(value: u128) -> String {
    format!("0x{value:x}")
}

pub(crate) fn parse_quantity(s: &str) -> Result<u128, String> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| format!("quantity without 0x prefix: {s}"))?;
    if digits.is_empty() {
        return Err("empty quantity".into());
    }
    u128::from_str_radix(digits, 16).map_err(|e| format!("bad quantity {s}: {e}"))
}

fn topic32(method: &str, s: &str) -> Result<[u8; 32], ChainError> {
    from_hex(s)
        .map_err(|e| bad(method, e))?
        .try_into()
        .map_err(|_| bad(method, "topic is not 32 bytes"))
}

impl RawLog {
    /// `None` for pending or reorged-out entries.
    fn into_entry(self) -> Result<Option<LogEntry>, ChainError> {
        const M: &str = "eth_getLogs";
        let (Some(block), Some(index), Some(hash), false) = (
            self.block_number,
            self.transaction_index,
            self.transaction_hash,
            self.removed,
        ) else {
            return Ok(None);
        };
        let block_number = parse_quantity(&block)
            .ok()
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| bad(M, "bad block number"))?;
        let transaction_index = parse_quantity(&index)
            .ok()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| bad(M, "bad transaction index"))?;
        Ok(Some(LogEntry {
            address: self.address.parse().map_err(|e| bad(M, e))?,
            topics: self
                .topics
                .iter()
                .map(|t| topic32(M, t))
                .collect::<Result<_, _>>()?,
            data: from_hex(&self.data).map_err(|e| bad(M, e))?,
            block_number,
            transaction_index,
            transaction_hash: hash.parse().map_err(|e| bad(M, e))?,
        }))
    }
}

#[async_trait]
impl ContractRpc for EthRpcClient {
    async fn call_at(
        &self,
        to: EvmAddress,
        data: Vec<u8>,
        at: Option<u64>,
    ) -> Result<Vec<u8>, ChainError> {
        let out: String = self
            .rpc
            .call(
                "eth_call",
                json!([{ "to": to.to_string(), "data": to_hex(&data) }, block_tag(at)]),
            )
            .await?;
        from_hex(&out).map_err(|e| bad("eth_call", e))
    }

    async fn send_transaction(&self, tx: EthCall) -> Result<TxHash, ChainError> {
        self.submit(
            "eth_sendTransaction",
            json!([{
                "from": tx.from.to_string(),
                "to": tx.to.to_string(),
                "data": to_hex(&tx.data),
                "value": quantity(tx.value.raw()),
            }]),
        )
        .await
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash, ChainError> {
        self.submit("eth_sendRawTransaction", json!([to_hex(raw)]))
            .await
    }

    async fn balance_at(
        &self,
        address: EvmAddress,
        at: Option<u64>,
    ) -> Result<Amount, ChainError> {
        let raw: String = self
            .rpc
            .call("eth_getBalance", json!([address.to_string(), block_tag(at)]))
            .await?;
        parse_quantity(&raw)
            .map(Amount::new)
            .map_err(|e| bad("eth_getBalance", e))
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, ChainError> {
        let topics: Vec<Value> = filter
            .topics
            .iter()
            .map(|t| t.map_or(Value::Null, |t| Value::String(to_hex(&t))))
            .collect();
        let raw: Vec<RawLog> = self
            .rpc
            .call(
                "eth_getLogs",
                json!([{
                    "address": filter.address.to_string(),
                    "fromBlock": quantity(filter.from_block as u128),
                    "toBlock": quantity(filter.to_block as u128),
                    "topics": topics,
                }]),
            )
            .await?;
        let mut entries = Vec::with_capacity(raw.len());
        for log in raw {
            if let Some(entry) = log.into_entry()? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        let raw: String = self.rpc.call("eth_blockNumber", json!([])).await?;
        parse_quantity(&raw)
            .ok()
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| bad("eth_blockNumber", format!("bad quantity {raw}")))
    }

    async fn block_time(&self, number: u64) -> Result<Timestamp, ChainError> {
        const M: &str = "eth_getBlockByNumber";
        let header: Option<RawHeader> = self
            .rpc
            .call(M, json!([quantity(u128::from(number)), false]))
            .await?;
        let header = header.ok_or_else(|| bad(M, format!("no block {number}")))?;
        parse_quantity(&header.timestamp)
            .ok()
            .and_then(|t| u64::try_from(t).ok())
            .map(Timestamp::new)
            .ok_or_else(|| bad(M, format!("bad timestamp {}", header.timestamp)))
    }
}
