use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::service::router::{AdapterRequest, RouterAdapter, RouterQuote};
use crate::service::types::ChainDescriptor;
use crate::service::utils::{BPS_DENOMINATOR, decimal_to_u256, u256_to_decimal, unit_price};

/// Price impact of a quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "bps", rename_all = "lowercase")]
pub enum PriceImpact {
    Measured(u32),
    /// No reliable reference price. Reported as [`PriceImpact::SENTINEL_BPS`].
    Unmeasurable,
}

impl PriceImpact {
    /// Treat-as-maximally-risky value for an impact that could not be computed.
    pub const SENTINEL_BPS: u32 = 9999;

    pub fn bps(&self) -> u32 {
        match self {
            Self::Measured(bps) => *bps,
            Self::Unmeasurable => Self::SENTINEL_BPS,
        }
    }

    pub fn is_measured(&self) -> bool {
        matches!(self, Self::Measured(_))
    }
}

/// Compares a small reference trade against the full trade on the same router and path.
#[derive(Debug, Clone)]
pub struct PriceImpactEstimator {
    reference_fraction: Decimal,
}

impl Default for PriceImpactEstimator {
    fn default() -> Self {
        // 1% of the requested input
        Self {
            reference_fraction: Decimal::new(1, 2),
        }
    }
}

impl PriceImpactEstimator {
    pub fn new(reference_fraction: Decimal) -> Self {
        Self { reference_fraction }
    }

    /// Impact of `full` measured against a reference quote from `adapter`.
    ///
    /// Any failure to obtain a usable reference price gives
    /// [`PriceImpact::Unmeasurable`], never zero.
    pub async fn estimate(
        &self,
        adapter: &dyn RouterAdapter,
        chain: &ChainDescriptor,
        request: &AdapterRequest,
        full: &RouterQuote,
    ) -> PriceImpact {
        let Some(reference_request) = self.reference_request(request) else {
            tracing::debug!("Reference amount rounds to zero, impact unmeasurable");
            return PriceImpact::Unmeasurable;
        };

        // Output only: the reference trade needs no gas simulation.
        let reference_out = match adapter.quote_amount_out(chain, &reference_request).await {
            Ok(amount_out) => amount_out,
            Err(e) => {
                tracing::warn!("Reference quote failed on {}: {}", adapter.name(), e);
                return PriceImpact::Unmeasurable;
            }
        };
        let Ok(reference_out) = u256_to_decimal(reference_out, request.decimals_out) else {
            return PriceImpact::Unmeasurable;
        };

        let (Some(reference_price), Some(large_price)) = (
            unit_price(reference_request.amount_in, reference_out),
            unit_price(full.amount_in, full.output_amount),
        ) else {
            return PriceImpact::Unmeasurable;
        };

        impact_from_prices(reference_price, large_price)
    }

    /// Same as [`estimate`](Self::estimate), as whole basis points in `[0, 9999]`.
    pub async fn estimate_impact_bps(
        &self,
        adapter: &dyn RouterAdapter,
        chain: &ChainDescriptor,
        request: &AdapterRequest,
        full: &RouterQuote,
    ) -> u32 {
        self.estimate(adapter, chain, request, full).await.bps()
    }

    fn reference_request(&self, request: &AdapterRequest) -> Option<AdapterRequest> {
        let amount = request.amount_in.checked_mul(self.reference_fraction)?;
        let amount_in_raw = decimal_to_u256(amount, request.decimals_in).ok()?;
        if amount_in_raw.is_zero() {
            return None;
        }
        // Price the raw amount actually quoted, not the truncated decimal.
        let amount_in = u256_to_decimal(amount_in_raw, request.decimals_in).ok()?;

        Some(AdapterRequest {
            amount_in,
            amount_in_raw,
            ..request.clone()
        })
    }
}

/// `|1 - large / reference| * 10000`, rounded to whole bps and clamped to the sentinel.
pub fn impact_from_prices(reference_price: Decimal, large_price: Decimal) -> PriceImpact {
    if reference_price <= Decimal::ZERO || large_price <= Decimal::ZERO {
        return PriceImpact::Unmeasurable;
    }

    let Some(bps) = large_price
        .checked_div(reference_price)
        .map(|ratio| (Decimal::ONE - ratio).abs())
        .and_then(|deviation| deviation.checked_mul(Decimal::from(BPS_DENOMINATOR)))
        .map(|bps| bps.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
    else {
        return PriceImpact::Unmeasurable;
    };

    let bps = bps.to_u32().unwrap_or(PriceImpact::SENTINEL_BPS);
    PriceImpact::Measured(bps.min(PriceImpact::SENTINEL_BPS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::router::UniswapV2Adapter;
    use crate::service::testing::{MockAdapter, MockRepository, test_chain};
    use crate::service::types::{GasEstimate, SwapPath};
    use alloy::primitives::{Address, U256};
    use alloy::sol_types::SolValue;
    use std::str::FromStr;
    use std::sync::Arc;

    fn request(amount_in: Decimal) -> AdapterRequest {
        AdapterRequest {
            path: SwapPath::direct(Address::repeat_byte(1), Address::repeat_byte(2)).unwrap(),
            amount_in,
            amount_in_raw: decimal_to_u256(amount_in, 18).unwrap(),
            decimals_in: 18,
            decimals_out: 18,
            slippage_bps: 50,
        }
    }

    fn full_quote(request: &AdapterRequest, output: &str) -> RouterQuote {
        let output = decimal_to_u256(Decimal::from_str(output).unwrap(), 18).unwrap();
        RouterQuote::new("mock", request, output, GasEstimate::Estimated(100_000)).unwrap()
    }

    #[test]
    fn test_impact_from_prices_should_work() {
        // 2% worse than the reference price
        let impact = impact_from_prices(Decimal::from(100), Decimal::from(98));
        assert_eq!(impact, PriceImpact::Measured(200));

        let none = impact_from_prices(Decimal::from(100), Decimal::from(100));
        assert_eq!(none, PriceImpact::Measured(0));
    }

    #[test]
    fn test_impact_is_clamped_and_rounded() {
        let huge = impact_from_prices(Decimal::ONE, Decimal::from(5));
        assert_eq!(huge, PriceImpact::Measured(9999));

        // 0.00005 -> 0.5 bps rounds away from zero
        let half = impact_from_prices(Decimal::ONE, Decimal::from_str("0.99995").unwrap());
        assert_eq!(half, PriceImpact::Measured(1));
    }

    #[test]
    fn test_zero_reference_is_unmeasurable() {
        let impact = impact_from_prices(Decimal::ZERO, Decimal::ONE);
        assert_eq!(impact, PriceImpact::Unmeasurable);
        assert_eq!(impact.bps(), 9999);
    }

    #[tokio::test]
    async fn test_reference_failure_returns_sentinel() {
        let chain = test_chain();
        let adapter = MockAdapter::new("mock", Decimal::from(2)).failing_below(Decimal::ONE);
        let request = request(Decimal::from(10));
        let full = full_quote(&request, "19.6");

        let estimator = PriceImpactEstimator::default();

        assert_eq!(
            estimator.estimate(&adapter, &chain, &request, &full).await,
            PriceImpact::Unmeasurable
        );
        assert_eq!(
            estimator
                .estimate_impact_bps(&adapter, &chain, &request, &full)
                .await,
            9999
        );
    }

    #[tokio::test]
    async fn test_measured_against_reference_quote() {
        let chain = test_chain();
        // Reference trade of 0.1 gets the flat rate of 2.
        let adapter = MockAdapter::new("mock", Decimal::from(2));
        let request = request(Decimal::from(10));
        let full = full_quote(&request, "19.6");

        let impact = PriceImpactEstimator::default()
            .estimate(&adapter, &chain, &request, &full)
            .await;

        // 1.96 vs 2.0 per unit
        assert_eq!(impact, PriceImpact::Measured(200));
        assert_eq!(
            adapter.requested_amounts(),
            vec![U256::from(100_000_000_000_000_000u128)]
        );
        assert_eq!(adapter.full_quote_count(), 0);
    }

    #[tokio::test]
    async fn test_dust_amount_is_unmeasurable() {
        let chain = test_chain();
        let adapter = MockAdapter::new("mock", Decimal::from(2));
        let mut request = request(Decimal::ZERO);
        request.amount_in = Decimal::from_str("0.000000000000000050").unwrap();
        request.amount_in_raw = U256::from(50u64);
        let full =
            RouterQuote::new("mock", &request, U256::from(100u64), GasEstimate::Estimated(1))
                .unwrap();

        let impact = PriceImpactEstimator::default()
            .estimate(&adapter, &chain, &request, &full)
            .await;

        assert_eq!(impact, PriceImpact::Unmeasurable);
        assert!(adapter.requested_amounts().is_empty());
    }

    #[tokio::test]
    async fn test_reference_quote_skips_gas_estimation() {
        let chain = test_chain();
        let router = Address::repeat_byte(0x21);
        let repository = Arc::new(MockRepository::new());
        let amounts = vec![U256::from(1u64), U256::from(2_000_000_000_000_000_000u128)];
        repository.set_call_result(router, Ok((amounts,).abi_encode_params().into()));
        let adapter = UniswapV2Adapter::new("uniswap_v2", router, repository.clone(), None);
        let request = request(Decimal::from(10));
        let full = full_quote(&request, "19.6");

        let impact = PriceImpactEstimator::default()
            .estimate(&adapter, &chain, &request, &full)
            .await;

        assert!(impact.is_measured());
        assert_eq!(repository.call_count(), 1);
        assert_eq!(repository.estimate_count(), 0);
    }
}
