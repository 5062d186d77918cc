use std::sync::Arc;

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use futures::future::join_all;
use tracing::instrument;

use super::{AdapterRequest, RouterAdapter, RouterQuote, simulation_deadline};
use crate::repository::ChainRepository;
use crate::repository::contract::{IQuoterV2, ISwapRouter};
use crate::service::types::{ChainDescriptor, GasEstimate};
use crate::service::utils::apply_slippage_raw;
use crate::service::{EngineError, ServiceResult};

/// Common Uniswap V3 fee tiers (0.05%, 0.3%, 1%), in hundredths of a bip.
pub const DEFAULT_FEE_TIERS: [u32; 3] = [500, 3000, 10000];

/// Encodes a V3 multi-hop path: `token (20) | fee (3) | token (20) | ...`.
///
/// The same fee tier is used for every hop.
pub fn encode_v3_path(tokens: &[Address], fee: u32) -> Bytes {
    let mut encoded = Vec::with_capacity(tokens.len() * 23);

    for (i, token) in tokens.iter().enumerate() {
        if i > 0 {
            encoded.extend_from_slice(&fee.to_be_bytes()[1..]);
        }
        encoded.extend_from_slice(token.as_slice());
    }

    encoded.into()
}

/// Uniswap V3, quoted through QuoterV2 across the configured fee tiers.
pub struct UniswapV3Adapter {
    name: String,
    quoter: Address,
    router: Address,
    fee_tiers: Vec<u32>,
    repository: Arc<dyn ChainRepository>,
    sender: Option<Address>,
}

impl UniswapV3Adapter {
    pub fn new(
        name: impl Into<String>,
        quoter: Address,
        router: Address,
        fee_tiers: Vec<u32>,
        repository: Arc<dyn ChainRepository>,
        sender: Option<Address>,
    ) -> Self {
        let fee_tiers = if fee_tiers.is_empty() {
            DEFAULT_FEE_TIERS.to_vec()
        } else {
            fee_tiers
        };

        Self {
            name: name.into(),
            quoter,
            router,
            fee_tiers,
            repository,
            sender,
        }
    }

    async fn quote_tier(
        &self,
        chain: &str,
        request: &AdapterRequest,
        fee: u32,
    ) -> ServiceResult<U256> {
        let data = IQuoterV2::quoteExactInputCall {
            path: encode_v3_path(request.path.tokens(), fee),
            amountIn: request.amount_in_raw,
        }
        .abi_encode();

        let output = self
            .repository
            .call_contract(chain, self.quoter, data.into())
            .await?;
        let quote = IQuoterV2::quoteExactInputCall::abi_decode_returns(&output).map_err(|e| {
            EngineError::BlockchainError(format!("Failed to decode quoteExactInput result: {e}"))
        })?;

        Ok(quote.amountOut)
    }

    /// Estimates `exactInput` on the swap router for the winning fee tier.
    async fn estimate_swap_gas(
        &self,
        chain: &ChainDescriptor,
        request: &AdapterRequest,
        fee: u32,
        amount_out: U256,
    ) -> GasEstimate {
        let data = ISwapRouter::exactInputCall {
            params: ISwapRouter::ExactInputParams {
                path: encode_v3_path(request.path.tokens(), fee),
                recipient: self.sender.unwrap_or(Address::ZERO),
                deadline: simulation_deadline(),
                amountIn: request.amount_in_raw,
                amountOutMinimum: apply_slippage_raw(amount_out, request.slippage_bps),
            },
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

    /// Quotes every fee tier concurrently and keeps the largest non-zero output.
    async fn best_tier(
        &self,
        chain: &ChainDescriptor,
        request: &AdapterRequest,
    ) -> ServiceResult<(u32, U256)> {
        let results = join_all(self.fee_tiers.iter().map(|fee| async move {
            (*fee, self.quote_tier(&chain.name, request, *fee).await)
        }))
        .await;

        let mut best: Option<(u32, U256)> = None;
        let mut last_error = None;
        for (fee, result) in results {
            match result {
                Ok(amount_out) if !amount_out.is_zero() => {
                    tracing::debug!("{} fee tier {}: amount_out={}", self.name, fee, amount_out);
                    if best.is_none_or(|(_, current)| amount_out > current) {
                        best = Some((fee, amount_out));
                    }
                }
                Ok(_) => tracing::debug!("{} fee tier {}: zero output", self.name, fee),
                Err(e) => {
                    tracing::debug!("{} fee tier {} failed: {}", self.name, fee, e);
                    last_error = Some(e);
                }
            }
        }

        let Some((fee, amount_out)) = best else {
            return Err(last_error.unwrap_or_else(|| {
                EngineError::InsufficientLiquidity(format!(
                    "No {} pool with liquidity across fee tiers {:?}",
                    self.name, self.fee_tiers
                ))
            }));
        };

        tracing::debug!(
            "{} selected fee tier {}: {} -> {}",
            self.name,
            fee,
            request.amount_in_raw,
            amount_out
        );
        Ok((fee, amount_out))
    }
}

#[async_trait]
impl RouterAdapter for UniswapV3Adapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn quote_amount_out(
        &self,
        chain: &ChainDescriptor,
        request: &AdapterRequest,
    ) -> ServiceResult<U256> {
        self.best_tier(chain, request).await.map(|(_, amount_out)| amount_out)
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
        let (fee, amount_out) = self.best_tier(chain, request).await?;
        let gas = self.estimate_swap_gas(chain, request, fee, amount_out).await;

        RouterQuote::new(&self.name, request, amount_out, gas)
    }
}
