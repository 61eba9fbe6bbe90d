//! Chain adapters.
//!
//! [`ChainAdapter`] is the one capability surface the governance engine and
//! the treasury talk to. Two implementations sit behind it, selected by
//! configuration:
//!
//! - [`UtxoChainAdapter`]: payloads in data outputs, bitcoind JSON-RPC
//! - [`ContractChainAdapter`]: DAO contract calls and logs, Ethereum JSON-RPC
//!
//! Both reach their node through a narrow RPC trait ([`UtxoRpc`],
//! [`ContractRpc`]) so tests can swap in in-memory chains.

pub mod abi;
pub mod adapter;
pub mod bitcoin_rpc;
pub mod config;
pub mod contract;
pub mod error;
pub mod eth_rpc;
pub mod rpc;
pub mod utxo;

pub use adapter::{ChainAdapter, ProposalFilter, ProposalStream, SignedTx, VoteSet};
pub use bitcoin_rpc::{BitcoinRpcClient, UnspentOutput, UtxoBlock, UtxoRpc};
pub use config::{ContractChainConfig, UtxoChainConfig};
pub use contract::ContractChainAdapter;
pub use error::{BroadcastError, BroadcastReason, ChainError};
pub use eth_rpc::{ContractRpc, EthCall, EthRpcClient, LogEntry, LogFilter};
pub use utxo::{data_payload, txid_hash, Funding, UtxoChainAdapter};
