pub mod v2;
pub mod v3;

use alloy::primitives::U256;
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::service::ServiceResult;
use crate::service::types::{ChainDescriptor, GasEstimate, SwapPath};
use crate::service::utils::{apply_slippage, apply_slippage_raw, u256_to_decimal};

pub use v2::UniswapV2Adapter;
pub use v3::UniswapV3Adapter;

/// One quote request as seen by a router adapter.
///
/// Amounts are already resolved against the tokens' decimals, so every
/// adapter of a chain quotes exactly the same raw input.
#[derive(Debug, Clone)]
pub struct AdapterRequest {
    pub path: SwapPath,
    pub amount_in: Decimal,
    pub amount_in_raw: U256,
    pub decimals_in: u8,
    pub decimals_out: u8,
    pub slippage_bps: u32,
}

/// A single router's answer for an [`AdapterRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterQuote {
    pub router: String,
    pub path: SwapPath,
    pub amount_in: Decimal,
    pub amount_in_raw: U256,
    pub output_amount: Decimal,
    pub output_amount_raw: U256,
    pub minimum_output: Decimal,
    pub minimum_output_raw: U256,
    pub gas: GasEstimate,
}

impl RouterQuote {
    /// Converts the last hop's raw output and applies the request's slippage.
    pub fn new(
        router: &str,
        request: &AdapterRequest,
        output_amount_raw: U256,
        gas: GasEstimate,
    ) -> ServiceResult<Self> {
        let output_amount = u256_to_decimal(output_amount_raw, request.decimals_out)?;
        let minimum_output = apply_slippage(output_amount, request.slippage_bps)?;

        Ok(Self {
            router: router.to_string(),
            path: request.path.clone(),
            amount_in: request.amount_in,
            amount_in_raw: request.amount_in_raw,
            output_amount,
            output_amount_raw,
            minimum_output,
            minimum_output_raw: apply_slippage_raw(output_amount_raw, request.slippage_bps),
            gas,
        })
    }
}

/// One DEX router family (Uniswap V2 forks, Uniswap V3, ...).
#[async_trait]
pub trait RouterAdapter: Send + Sync {
    /// Identifier reported in quotes, e.g. `uniswap_v2` or `pancakeswap`.
    fn name(&self) -> &str;

    /// Raw output of the last hop, without simulating the swap for gas.
    async fn quote_amount_out(
        &self,
        chain: &ChainDescriptor,
        request: &AdapterRequest,
    ) -> ServiceResult<U256>;

    /// Full quote: output, slippage floor and gas estimate.
    async fn get_quote(
        &self,
        chain: &ChainDescriptor,
        request: &AdapterRequest,
    ) -> ServiceResult<RouterQuote>;
}

/// Swap deadline used for gas simulation.
pub(crate) fn simulation_deadline() -> U256 {
    U256::from(chrono::Utc::now().timestamp() + 3600)
}
