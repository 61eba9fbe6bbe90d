//! Immutable per-adapter configuration, deserialized from the node's TOML sections.

use bitcoin::Network;
use serde::{Deserialize, Serialize};

fn default_confirmations() -> u32 {
    1
}

fn default_max_data_carrier_bytes() -> usize {
    tandem_codec::MAX_DATA_CARRIER_BYTES
}

fn default_fee_rate() -> u64 {
    2
}

fn default_log_chunk_size() -> u64 {
    5_000
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoChainConfig {
    pub rpc_url: String,
    #[serde(default)]
    pub rpc_user: Option<String>,
    #[serde(default)]
    pub rpc_password: Option<String>,
    pub network: Network,
    pub treasury_address: String,
    /// Minimum confirmations for spendable outputs and scanned blocks.
    #[serde(default = "default_confirmations")]
    pub confirmations: u32,
    /// First block height scanned for governance payloads.
    #[serde(default)]
    pub scan_start_height: u64,
    #[serde(default = "default_max_data_carrier_bytes")]
    pub max_data_carrier_bytes: usize,
    /// Hex asset id gating membership; native balance when absent.
    #[serde(default)]
    pub membership_asset: Option<String>,
    /// Hex leaf scripts of asset commitments the treasury already holds.
    #[serde(default)]
    pub asset_leaves: Vec<String>,
    /// Fee rate for payload transactions, in sat/vB.
    #[serde(default = "default_fee_rate")]
    pub payload_fee_rate: u64,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Limit for `getblock` calls, which return whole blocks; the request
    /// timeout when absent.
    #[serde(default)]
    pub block_timeout_secs: Option<u64>,
}

impl UtxoChainConfig {
    pub fn new(rpc_url: impl Into<String>, network: Network, treasury_address: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            rpc_user: None,
            rpc_password: None,
            network,
            treasury_address: treasury_address.into(),
            confirmations: default_confirmations(),
            scan_start_height: 0,
            max_data_carrier_bytes: default_max_data_carrier_bytes(),
            membership_asset: None,
            asset_leaves: Vec::new(),
            payload_fee_rate: default_fee_rate(),
            request_timeout_secs: default_timeout_secs(),
            block_timeout_secs: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractChainConfig {
    pub rpc_url: String,
    pub dao_address: String,
    /// Node-managed account used for `execute` calls.
    pub sender: String,
    pub treasury_address: String,
    /// ERC-20 token gating membership; native balance when absent.
    #[serde(default)]
    pub membership_token: Option<String>,
    #[serde(default)]
    pub log_start_block: u64,
    /// Largest block span requested per `eth_getLogs` call.
    #[serde(default = "default_log_chunk_size")]
    pub log_chunk_size: u64,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ContractChainConfig {
    pub fn new(
        rpc_url: impl Into<String>,
        dao_address: impl Into<String>,
        sender: impl Into<String>,
        treasury_address: impl Into<String>,
    ) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            dao_address: dao_address.into(),
            sender: sender.into(),
            treasury_address: treasury_address.into(),
            membership_token: None,
            log_start_block: 0,
            log_chunk_size: default_log_chunk_size(),
            request_timeout_secs: default_timeout_secs(),
        }
    }
}
