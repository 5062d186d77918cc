use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, Bytes};
use alloy::sol_types::SolCall;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::config::{Config, RouterConfig};
use crate::repository::contract::IERC20;
use crate::repository::{ChainRepository, RpcGateway};
use crate::service::aggregator::QuoteAggregator;
use crate::service::gas::GasOracle;
use crate::service::impact::PriceImpactEstimator;
use crate::service::path::{FactoryPairRegistry, PairRegistry, PathFinder};
use crate::service::router::{RouterAdapter, UniswapV2Adapter, UniswapV3Adapter};
use crate::service::token_registry::{OnChainTokenMetadata, TokenMetadataSource, TokenRegistry};
use crate::service::tracker::{TrackingHandle, TransactionTracker};
use crate::service::types::{
    BalanceResponse, ChainDescriptor, GasSnapshot, SwapQuote, TransactionRecord,
};
use crate::service::utils::format_balance;
use crate::service::{EngineError, ServiceResult};

/// Runtime knobs of the engine that are not tied to a single chain.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub receipt_poll_interval: Duration,
    pub default_tx_timeout: Duration,
    /// `from` address for router simulations. Some routers revert for the zero address.
    pub simulation_sender: Option<Address>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            receipt_poll_interval: Duration::from_secs(2),
            default_tx_timeout: Duration::from_secs(180),
            simulation_sender: None,
        }
    }
}

/// Entry point for quoting, gas, balances and transaction tracking across chains.
pub struct SwapEngine {
    chains: HashMap<String, ChainDescriptor>,
    token_registry: Arc<TokenRegistry>,
    token_metadata: Arc<dyn TokenMetadataSource>,
    repository: Arc<dyn ChainRepository>,
    aggregator: QuoteAggregator,
    gas_oracle: Arc<GasOracle>,
    tracker: Arc<TransactionTracker>,
    settings: EngineSettings,
}

impl SwapEngine {
    pub fn new(
        chains: Vec<ChainDescriptor>,
        token_registry: TokenRegistry,
        repository: Arc<dyn ChainRepository>,
        pair_registry: Arc<dyn PairRegistry>,
        settings: EngineSettings,
    ) -> Self {
        let token_registry = Arc::new(token_registry);
        let token_metadata: Arc<dyn TokenMetadataSource> = Arc::new(OnChainTokenMetadata::new(
            Arc::clone(&token_registry),
            Arc::clone(&repository),
        ));
        let gas_oracle = Arc::new(GasOracle::new(Arc::clone(&repository)));
        let aggregator = QuoteAggregator::new(
            PathFinder::new(pair_registry),
            Arc::clone(&token_metadata),
            Arc::clone(&gas_oracle),
            PriceImpactEstimator::default(),
        );
        let tracker = Arc::new(TransactionTracker::new(
            Arc::clone(&repository),
            settings.receipt_poll_interval,
        ));

        Self {
            chains: chains.into_iter().map(|chain| (chain.name.clone(), chain)).collect(),
            token_registry,
            token_metadata,
            repository,
            aggregator,
            gas_oracle,
            tracker,
            settings,
        }
    }

    /// Wires the HTTP gateway, pair factories and router adapters described by `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let request_timeout = Duration::from_secs(config.engine.request_timeout_secs);

        let mut gateway = RpcGateway::new();
        for chain in &config.chains {
            gateway.connect_http(&chain.name, chain.rpc_urls.clone(), request_timeout)?;
        }
        let repository: Arc<dyn ChainRepository> = Arc::new(gateway);

        let mut pair_registry = FactoryPairRegistry::new(Arc::clone(&repository));
        for chain in &config.chains {
            if let Some(factory) = chain.pair_factory {
                pair_registry = pair_registry.with_factory(&chain.name, factory);
            }
        }

        let chains = config
            .chains
            .iter()
            .map(ChainDescriptor::from_config)
            .collect::<ServiceResult<Vec<_>>>()?;

        let settings = EngineSettings {
            receipt_poll_interval: Duration::from_millis(config.engine.receipt_poll_interval_ms),
            default_tx_timeout: Duration::from_secs(config.engine.default_tx_timeout_secs),
            simulation_sender: config.engine.simulation_sender,
        };

        let mut engine = Self::new(
            chains,
            TokenRegistry::from_config(config),
            Arc::clone(&repository),
            Arc::new(pair_registry),
            settings,
        );

        for chain in &config.chains {
            for router in &chain.routers {
                let adapter: Arc<dyn RouterAdapter> = match router {
                    RouterConfig::V2 { name, router } => Arc::new(UniswapV2Adapter::new(
                        name.clone(),
                        *router,
                        Arc::clone(&repository),
                        engine.settings.simulation_sender,
                    )),
                    RouterConfig::V3 {
                        name,
                        router,
                        quoter,
                        fee_tiers,
                    } => Arc::new(UniswapV3Adapter::new(
                        name.clone(),
                        *quoter,
                        *router,
                        fee_tiers.clone(),
                        Arc::clone(&repository),
                        engine.settings.simulation_sender,
                    )),
                };
                engine.register_adapter(&chain.name, adapter);
            }

            tracing::info!(
                "Configured chain {} with {} endpoints and {} routers",
                chain.name,
                chain.rpc_urls.len(),
                chain.routers.len()
            );
        }

        Ok(engine)
    }

    pub fn register_adapter(&mut self, chain: &str, adapter: Arc<dyn RouterAdapter>) {
        tracing::debug!("Registering router {} on {}", adapter.name(), chain);
        self.aggregator.register_adapter(chain, adapter);
    }

    pub fn chain(&self, name: &str) -> ServiceResult<&ChainDescriptor> {
        self.chains
            .get(name)
            .ok_or_else(|| EngineError::UnknownChain(name.to_string()))
    }

    /// Configured chain names, sorted.
    pub fn chains(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.chains.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn token_registry(&self) -> &TokenRegistry {
        &self.token_registry
    }

    pub fn token_metadata(&self) -> Arc<dyn TokenMetadataSource> {
        Arc::clone(&self.token_metadata)
    }

    /// Best quote across the chain's routers. Tokens are symbols or `0x` addresses.
    #[instrument(skip(self), err)]
    pub async fn get_quote(
        &self,
        chain: &str,
        token_in: &str,
        token_out: &str,
        amount_in: Decimal,
        slippage_bps: u32,
    ) -> ServiceResult<SwapQuote> {
        let descriptor = self.chain(chain)?;
        let token_in = self.token_registry.resolve(chain, token_in)?;
        let token_out = self.token_registry.resolve(chain, token_out)?;

        self.aggregator
            .get_best_quote(descriptor, token_in, token_out, amount_in, slippage_bps)
            .await
    }

    /// Current fee levels, or the chain's fallback constants if the chain cannot be read.
    #[instrument(skip(self), err)]
    pub async fn get_gas_snapshot(&self, chain: &str) -> ServiceResult<GasSnapshot> {
        let descriptor = self.chain(chain)?;
        Ok(self.gas_oracle.snapshot(descriptor).await)
    }

    /// Broadcasts `payload` and polls until it is confirmed, failed, timed out or cancelled.
    #[instrument(skip(self, payload, cancel), err)]
    pub async fn submit_and_track(
        &self,
        chain: &str,
        payload: Bytes,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> ServiceResult<TransactionRecord> {
        self.chain(chain)?;
        let record = self.tracker.broadcast(chain, &payload).await?;
        let timeout = timeout.unwrap_or(self.settings.default_tx_timeout);

        Ok(self.tracker.track(record, timeout, cancel).await)
    }

    /// Broadcasts `payload` and tracks it on a background task.
    #[instrument(skip(self, payload), err)]
    pub async fn spawn_tracking(
        &self,
        chain: &str,
        payload: Bytes,
        timeout: Option<Duration>,
    ) -> ServiceResult<TrackingHandle> {
        self.chain(chain)?;
        let record = self.tracker.broadcast(chain, &payload).await?;
        let timeout = timeout.unwrap_or(self.settings.default_tx_timeout);

        Ok(self.tracker.spawn(record, timeout))
    }

    #[instrument(skip(self), err)]
    pub async fn get_native_balance(
        &self,
        chain: &str,
        address: &str,
    ) -> ServiceResult<BalanceResponse> {
        let descriptor = self.chain(chain)?;
        let address = parse_address(address)?;

        let balance = self.repository.balance(chain, address).await?;

        Ok(BalanceResponse {
            chain: chain.to_string(),
            address,
            token: None,
            balance: balance.to_string(),
            formatted_balance: format_balance(balance, descriptor.native_decimals),
            decimals: descriptor.native_decimals,
            symbol: descriptor.native_symbol.clone(),
        })
    }

    /// ERC20 balance of `owner`. `token` is a symbol or a contract address.
    #[instrument(skip(self), err)]
    pub async fn get_token_balance(
        &self,
        chain: &str,
        token: &str,
        owner: &str,
    ) -> ServiceResult<BalanceResponse> {
        self.chain(chain)?;
        let token_address = self.token_registry.resolve(chain, token)?;
        let owner = parse_address(owner)?;

        let call = IERC20::balanceOfCall { account: owner };
        let (output, decimals) = tokio::try_join!(
            async {
                self.repository
                    .call_contract(chain, token_address, call.abi_encode().into())
                    .await
                    .map_err(EngineError::from)
            },
            self.token_metadata.get_decimals(chain, token_address),
        )?;
        let balance = IERC20::balanceOfCall::abi_decode_returns(&output).map_err(|e| {
            EngineError::BlockchainError(format!(
                "Failed to decode balance of {token_address}: {e}"
            ))
        })?;

        let symbol = self
            .token_registry
            .by_address(chain, token_address)
            .map(|info| info.symbol.clone())
            .unwrap_or_else(|| token_address.to_string());

        tracing::info!("Balance of {} for {} on {}: {}", symbol, owner, chain, balance);

        Ok(BalanceResponse {
            chain: chain.to_string(),
            address: owner,
            token: Some(token_address),
            balance: balance.to_string(),
            formatted_balance: format_balance(balance, decimals),
            decimals,
            symbol,
        })
    }
}

fn parse_address(address: &str) -> ServiceResult<Address> {
    Address::from_str(address.trim())
        .map_err(|e| EngineError::InvalidAddress(format!("{address}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[tokio::test]
    #[serial]
    async fn test_engine_from_config_should_work() {
        let config = Config::from_yaml("config/test.yaml").await.unwrap();

        let engine = SwapEngine::from_config(&config).unwrap();

        assert_eq!(engine.chains(), vec!["ethereum"]);
        assert_eq!(engine.aggregator.adapters("ethereum").len(), 2);
        assert_eq!(engine.settings.receipt_poll_interval, Duration::from_millis(500));
        assert!(engine.token_registry().contains("ethereum", "USDC"));
        // Native symbol is aliased to the wrapped token.
        assert_eq!(
            engine.token_registry().resolve("ethereum", "ETH").unwrap(),
            engine.chain("ethereum").unwrap().wrapped_native
        );
    }

    #[test]
    fn test_parse_address_should_fail_on_garbage() {
        assert!(matches!(parse_address("0x1234"), Err(EngineError::InvalidAddress(_))));
        assert!(parse_address(" 0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2 ").is_ok());
    }
}
