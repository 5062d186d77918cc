use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::Address;
use alloy::sol_types::SolCall;
use async_trait::async_trait;

use crate::repository::ChainRepository;
use crate::repository::contract::IUniswapV2Factory;
use crate::service::types::{ChainDescriptor, SwapPath};
use crate::service::{EngineError, ServiceResult};

/// Answers whether a liquidity pair exists between two tokens.
#[async_trait]
pub trait PairRegistry: Send + Sync {
    async fn pair_exists(
        &self,
        chain: &str,
        token_a: Address,
        token_b: Address,
    ) -> ServiceResult<bool>;
}

/// Pair registry backed by a Uniswap V2 style factory's `getPair`.
pub struct FactoryPairRegistry {
    repository: Arc<dyn ChainRepository>,
    factories: HashMap<String, Address>,
}

impl FactoryPairRegistry {
    pub fn new(repository: Arc<dyn ChainRepository>) -> Self {
        Self {
            repository,
            factories: HashMap::new(),
        }
    }

    pub fn with_factory(mut self, chain: impl Into<String>, factory: Address) -> Self {
        self.factories.insert(chain.into(), factory);
        self
    }
}

#[async_trait]
impl PairRegistry for FactoryPairRegistry {
    async fn pair_exists(
        &self,
        chain: &str,
        token_a: Address,
        token_b: Address,
    ) -> ServiceResult<bool> {
        let factory = self.factories.get(chain).ok_or_else(|| {
            EngineError::BlockchainError(format!("No pair factory configured for {chain}"))
        })?;

        let data = IUniswapV2Factory::getPairCall {
            tokenA: token_a,
            tokenB: token_b,
        }
        .abi_encode();
        let output = self
            .repository
            .call_contract(chain, *factory, data.into())
            .await?;
        let pair = IUniswapV2Factory::getPairCall::abi_decode_returns(&output).map_err(|e| {
            EngineError::BlockchainError(format!("Failed to decode getPair result: {e}"))
        })?;

        Ok(pair != Address::ZERO)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairCheck {
    Exists,
    /// The registry could not answer; treated as existing.
    Assumed,
    Missing,
}

impl PairCheck {
    fn usable(self) -> bool {
        self != PairCheck::Missing
    }

    fn assumed(self) -> bool {
        self == PairCheck::Assumed
    }
}

/// Finds a direct or two-hop path between two tokens.
pub struct PathFinder {
    registry: Arc<dyn PairRegistry>,
}

impl PathFinder {
    pub fn new(registry: Arc<dyn PairRegistry>) -> Self {
        Self { registry }
    }

    /// Tries, in order: the direct pair, a hop through the wrapped-native
    /// token, a hop through the reference stablecoin. `None` means no route.
    pub async fn find_path(
        &self,
        chain: &ChainDescriptor,
        token_in: Address,
        token_out: Address,
    ) -> Option<SwapPath> {
        if token_in == token_out {
            return None;
        }

        let direct = self.check_pair(&chain.name, token_in, token_out).await;
        if direct.usable() {
            return SwapPath::direct(token_in, token_out)
                .map(|path| path.with_assumed(direct.assumed()));
        }

        for intermediate in [chain.wrapped_native, chain.reference_stable] {
            if intermediate == Address::ZERO
                || intermediate == token_in
                || intermediate == token_out
            {
                continue;
            }

            let first = self.check_pair(&chain.name, token_in, intermediate).await;
            if !first.usable() {
                continue;
            }
            let second = self.check_pair(&chain.name, intermediate, token_out).await;
            if !second.usable() {
                continue;
            }

            return SwapPath::via(token_in, intermediate, token_out)
                .map(|path| path.with_assumed(first.assumed() || second.assumed()));
        }

        tracing::debug!("No route on {} for {} -> {}", chain.name, token_in, token_out);
        None
    }

    async fn check_pair(&self, chain: &str, token_a: Address, token_b: Address) -> PairCheck {
        match self.registry.pair_exists(chain, token_a, token_b).await {
            Ok(true) => PairCheck::Exists,
            Ok(false) => PairCheck::Missing,
            Err(e) => {
                tracing::warn!(
                    "Pair registry unavailable for {} {}/{}, assuming the pair exists: {}",
                    chain,
                    token_a,
                    token_b,
                    e
                );
                PairCheck::Assumed
            }
        }
    }
}
