//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::Path;

use tandem_adapters::{ContractChainConfig, UtxoChainConfig};
use tandem_governance::GovernanceParams;
use tandem_treasury::TreasuryConfig;

use crate::logging::LogFormat;
use crate::NodeError;

/// Configuration for a tandem node.
///
/// Loaded from a TOML file via [`NodeConfig::from_toml_file`] or built
/// programmatically (e.g. for tests). Each chain section is optional; a
/// node needs at least one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub utxo: Option<UtxoChainConfig>,

    #[serde(default)]
    pub contract: Option<ContractChainConfig>,

    #[serde(default)]
    pub governance: GovernanceParams,

    #[serde(default)]
    pub treasury: TreasuryConfig,

    /// Bound on every chain RPC call; applied to both chain sections.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn log_format(&self) -> Result<LogFormat, NodeError> {
        self.log_format.parse()
    }

    /// Chain sections with the node-wide request timeout applied.
    pub fn utxo_section(&self) -> Option<UtxoChainConfig> {
        self.utxo.clone().map(|mut section| {
            section.request_timeout_secs = self.request_timeout_secs;
            section
        })
    }

    pub fn contract_section(&self) -> Option<ContractChainConfig> {
        self.contract.clone().map(|mut section| {
            section.request_timeout_secs = self.request_timeout_secs;
            section
        })
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        if self.utxo.is_none() && self.contract.is_none() {
            return Err(NodeError::Config(
                "configure at least one of [utxo] or [contract]".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(NodeError::Config("request_timeout_secs must be positive".into()));
        }
        self.governance.validate()?;
        self.treasury.policy.validate()?;
        self.log_format()?;
        Ok(())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            utxo: None,
            contract: None,
            governance: GovernanceParams::default(),
            treasury: TreasuryConfig::default(),
            request_timeout_secs: default_request_timeout_secs(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}
