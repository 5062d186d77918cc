use std::sync::Arc;

use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use tracing::instrument;

use super::{AdapterRequest, RouterAdapter, RouterQuote, simulation_deadline};
use crate::repository::ChainRepository;
use crate::repository::contract::IUniswapV2Router02;
use crate::service::types::{ChainDescriptor, GasEstimate};
use crate::service::utils::apply_slippage_raw;
use crate::service::{EngineError, ServiceResult};

/// Uniswap V2 Router02 and its forks (SushiSwap, PancakeSwap, QuickSwap).
pub struct UniswapV2Adapter {
    name: String,
    router: Address,
    repository: Arc<dyn ChainRepository>,
    sender: Option<Address>,
}

impl UniswapV2Adapter {
    pub fn new(
        name: impl Into<String>,
        router: Address,
        repository: Arc<dyn ChainRepository>,
        sender: Option<Address>,
    ) -> Self {
        Self {
            name: name.into(),
            router,
            repository,
            sender,
        }
    }

    async fn get_amount_out(&self, chain: &str, request: &AdapterRequest) -> ServiceResult<U256> {
        let data = IUniswapV2Router02::getAmountsOutCall {
            amountIn: request.amount_in_raw,
            path: request.path.tokens().to_vec(),
        }
        .abi_encode();

        let output = self
            .repository
            .call_contract(chain, self.router, data.into())
            .await?;
        let amounts = IUniswapV2Router02::getAmountsOutCall::abi_decode_returns(&output)
            .map_err(|e| {
                EngineError::BlockchainError(format!("Failed to decode getAmountsOut result: {e}"))
            })?;

        amounts
            .last()
            .copied()
            .ok_or_else(|| EngineError::BlockchainError("No output amount returned".to_string()))
    }

    /// Estimates `swapExactTokensForTokens` for the quoted amounts.
    async fn estimate_swap_gas(
        &self,
        chain: &ChainDescriptor,
        request: &AdapterRequest,
        amount_out: U256,
    ) -> GasEstimate {
        let data = IUniswapV2Router02::swapExactTokensForTokensCall {
            amountIn: request.amount_in_raw,
            amountOutMin: apply_slippage_raw(amount_out, request.slippage_bps),
            path: request.path.tokens().to_vec(),
            to: self.sender.unwrap_or(Address::ZERO),
            deadline: simulation_deadline(),
        }
        .abi_encode();

        match self
            .repository
            .estimate_gas(&chain.name, self.sender, self.router, data.into())
            .await
        {
            Ok(gas) => GasEstimate::Estimated(gas),
            Err(e) => {
                tracing::debug!(
                    "{} gas estimate failed on {}, using fallback: {}",
                    self.name,
                    chain.name,
                    e
                );
                GasEstimate::fallback(chain.default_gas_limit)
            }
        }
    }
}

#[async_trait]
impl RouterAdapter for UniswapV2Adapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn quote_amount_out(
        &self,
        chain: &ChainDescriptor,
        request: &AdapterRequest,
    ) -> ServiceResult<U256> {
        let amount_out = self.get_amount_out(&chain.name, request).await?;
        if amount_out.is_zero() {
            return Err(EngineError::InsufficientLiquidity(format!(
                "{} returned zero output for {} {}",
                self.name,
                request.amount_in,
                request.path.token_in()
            )));
        }

        Ok(amount_out)
    }

    #[instrument(
        skip(self, chain, request),
        fields(router = %self.name, chain = %chain.name),
        err
    )]
    async fn get_quote(
        &self,
        chain: &ChainDescriptor,
        request: &AdapterRequest,
    ) -> ServiceResult<RouterQuote> {
        let amount_out = self.quote_amount_out(chain, request).await?;

        let gas = self.estimate_swap_gas(chain, request, amount_out).await;
        tracing::debug!(
            "{} quote: {} -> {} (gas {:?})",
            self.name,
            request.amount_in_raw,
            amount_out,
            gas
        );

        RouterQuote::new(&self.name, request, amount_out, gas)
    }
}
