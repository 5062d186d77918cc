use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::Address;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::repository::ChainRepository;
use crate::repository::contract::IERC20;
use crate::service::utils::MAX_TOKEN_DECIMALS;
use crate::service::{EngineError, ServiceResult};

/// A token known to the engine on one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub symbol: String,
    pub address: Address,
    pub decimals: u8,
}

/// Token registry for mapping symbols to contract addresses, per chain
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    chains: HashMap<String, HashMap<String, TokenInfo>>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry from each chain's `tokens` list.
    ///
    /// The native symbol (ETH, BNB, MATIC) is aliased to the wrapped-native
    /// token so that quotes for the native asset route through its ERC20 form.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();

        for chain in &config.chains {
            for token in &chain.tokens {
                registry.register(
                    &chain.name,
                    TokenInfo {
                        symbol: token.symbol.clone(),
                        address: token.address,
                        decimals: token.decimals,
                    },
                );
            }

            if !registry.contains(&chain.name, &chain.native_symbol) {
                registry.register(
                    &chain.name,
                    TokenInfo {
                        symbol: chain.native_symbol.clone(),
                        address: chain.wrapped_native,
                        decimals: chain.native_decimals,
                    },
                );
            }
        }

        registry
    }

    pub fn register(&mut self, chain: &str, token: TokenInfo) {
        self.chains
            .entry(chain.to_string())
            .or_default()
            .insert(token.symbol.to_uppercase(), token);
    }

    /// Lookup token by symbol (case-insensitive)
    pub fn lookup(&self, chain: &str, symbol: &str) -> Option<&TokenInfo> {
        self.chains.get(chain)?.get(&symbol.to_uppercase())
    }

    /// Lookup token by contract address. Aliased symbols share an address; the
    /// alphabetically first symbol is returned so the answer is stable.
    pub fn by_address(&self, chain: &str, address: Address) -> Option<&TokenInfo> {
        self.chains
            .get(chain)?
            .iter()
            .filter(|(_, token)| token.address == address)
            .min_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, token)| token)
    }

    pub fn contains(&self, chain: &str, symbol: &str) -> bool {
        self.lookup(chain, symbol).is_some()
    }

    /// Get list of all supported token symbols on a chain (sorted alphabetically)
    pub fn supported_tokens(&self, chain: &str) -> Vec<String> {
        let mut tokens: Vec<String> = self
            .chains
            .get(chain)
            .map(|tokens| tokens.keys().cloned().collect())
            .unwrap_or_default();
        tokens.sort();
        tokens
    }

    /// Parse a token address or a registered symbol such as "USDT".
    pub fn resolve(&self, chain: &str, token: &str) -> ServiceResult<Address> {
        let token = token.trim();

        if token.starts_with("0x") {
            return Address::from_str(token).map_err(|e| {
                EngineError::InvalidAddress(format!("{token}: {e}"))
            });
        }

        self.lookup(chain, token)
            .map(|info| info.address)
            .ok_or_else(|| {
                tracing::warn!("Token symbol not found in registry for {}: {}", chain, token);
                EngineError::TokenNotFound(format!(
                    "{} on {} (Supported tokens: {})",
                    token,
                    chain,
                    self.supported_tokens(chain).join(", ")
                ))
            })
    }
}

/// Decimal-count lookup for tokens.
#[async_trait]
pub trait TokenMetadataSource: Send + Sync {
    async fn get_decimals(&self, chain: &str, token: Address) -> ServiceResult<u8>;
}

/// Registry first, then ERC20 `decimals()` on chain. On-chain answers are cached.
pub struct OnChainTokenMetadata {
    registry: Arc<TokenRegistry>,
    repository: Arc<dyn ChainRepository>,
    cache: RwLock<HashMap<(String, Address), u8>>,
}

impl OnChainTokenMetadata {
    pub fn new(registry: Arc<TokenRegistry>, repository: Arc<dyn ChainRepository>) -> Self {
        Self {
            registry,
            repository,
            cache: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl TokenMetadataSource for OnChainTokenMetadata {
    async fn get_decimals(&self, chain: &str, token: Address) -> ServiceResult<u8> {
        if let Some(info) = self.registry.by_address(chain, token) {
            return Ok(info.decimals);
        }

        let key = (chain.to_string(), token);
        if let Some(decimals) = self.cache.read().await.get(&key) {
            return Ok(*decimals);
        }

        let data = IERC20::decimalsCall {}.abi_encode();
        let output = self
            .repository
            .call_contract(chain, token, data.into())
            .await?;
        let decimals = IERC20::decimalsCall::abi_decode_returns(&output).map_err(|e| {
            EngineError::BlockchainError(format!("Failed to decode decimals of {token}: {e}"))
        })?;
        if decimals > MAX_TOKEN_DECIMALS {
            return Err(EngineError::BlockchainError(format!(
                "Token {token} reports {decimals} decimals, \
                 at most {MAX_TOKEN_DECIMALS} are supported"
            )));
        }

        tracing::debug!("Fetched decimals for {} on {}: {}", token, chain, decimals);
        self.cache.write().await.insert(key, decimals);

        Ok(decimals)
    }
}
