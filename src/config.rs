use std::collections::{HashMap, HashSet};
use std::path::Path;

use alloy::primitives::Address;
use anyhow::{Context, bail};
use dotenv::dotenv;
use envsubst::substitute;
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    pub chains: Vec<ChainConfig>,
}

impl Config {
    pub async fn from_yaml(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        dotenv().ok();

        let path = path.as_ref();
        let file_content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file from path: {}", path.display()))?;

        Self::from_yaml_str(&file_content)
    }

    /// Parses a YAML document after substituting `${RPC_*}` and `${ENGINE_*}`
    /// environment variables.
    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        let env_vars: HashMap<String, String> = std::env::vars()
            .filter(|(key, _)| key.starts_with("RPC_") || key.starts_with("ENGINE_"))
            .collect();

        let interpolated = substitute(content, &env_vars)
            .map_err(|e| {
                anyhow::anyhow!("Failed to substitute environment variables in YAML: {e:?}")
            })?;

        let config: Config =
            serde_yaml::from_str(&interpolated).context("Failed to parse YAML configuration")?;
        config.validate()?;

        Ok(config)
    }

    pub fn chain(&self, name: &str) -> Option<&ChainConfig> {
        self.chains.iter().find(|chain| chain.name == name)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.chains.is_empty() {
            bail!("configuration defines no chains");
        }

        let mut names = HashSet::new();
        for chain in &self.chains {
            if !names.insert(chain.name.as_str()) {
                bail!("chain {} is configured twice", chain.name);
            }
            if chain.rpc_urls.iter().all(|url| url.trim().is_empty()) {
                bail!("chain {} has no RPC endpoints", chain.name);
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
    #[serde(default = "default_tx_timeout_secs")]
    pub default_tx_timeout_secs: u64,
    /// Account used as `from` when simulating router calls.
    #[serde(default)]
    pub simulation_sender: Option<Address>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            receipt_poll_interval_ms: default_receipt_poll_interval_ms(),
            default_tx_timeout_secs: default_tx_timeout_secs(),
            simulation_sender: None,
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_receipt_poll_interval_ms() -> u64 {
    2_000
}

fn default_tx_timeout_secs() -> u64 {
    180
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub name: String,
    pub chain_id: u64,
    pub native_symbol: String,
    #[serde(default = "default_native_decimals")]
    pub native_decimals: u8,
    pub default_gas_limit: u64,
    pub block_time_secs: u64,
    pub wrapped_native: Address,
    pub reference_stable: Address,
    pub min_priority_fee_gwei: Decimal,
    pub fallback_gas: FallbackGasConfig,
    pub rpc_urls: Vec<String>,
    #[serde(default)]
    pub pair_factory: Option<Address>,
    #[serde(default)]
    pub routers: Vec<RouterConfig>,
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

fn default_native_decimals() -> u8 {
    18
}

#[derive(Debug, Clone, Deserialize)]
pub struct FallbackGasConfig {
    pub base_fee_gwei: Decimal,
    pub priority_fee_gwei: Decimal,
    pub gas_price_gwei: Decimal,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RouterConfig {
    V2 {
        name: String,
        router: Address,
    },
    V3 {
        name: String,
        router: Address,
        quoter: Address,
        #[serde(default)]
        fee_tiers: Vec<u32>,
    },
}

impl RouterConfig {
    pub fn name(&self) -> &str {
        match self {
            Self::V2 { name, .. } | Self::V3 { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub symbol: String,
    pub address: Address,
    pub decimals: u8,
}
