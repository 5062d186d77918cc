use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::Address;
use futures::future::join_all;
use rust_decimal::Decimal;
use tracing::instrument;

use crate::service::gas::GasOracle;
use crate::service::impact::PriceImpactEstimator;
use crate::service::path::PathFinder;
use crate::service::router::{AdapterRequest, RouterAdapter, RouterQuote};
use crate::service::token_registry::TokenMetadataSource;
use crate::service::types::{ChainDescriptor, SwapQuote};
use crate::service::utils::{BPS_DENOMINATOR, decimal_to_u256};
use crate::service::{EngineError, ServiceResult};

/// Quotes a swap on every router of a chain and keeps the best answer.
pub struct QuoteAggregator {
    path_finder: PathFinder,
    token_metadata: Arc<dyn TokenMetadataSource>,
    gas_oracle: Arc<GasOracle>,
    impact: PriceImpactEstimator,
    adapters: HashMap<String, Vec<Arc<dyn RouterAdapter>>>,
}

impl QuoteAggregator {
    pub fn new(
        path_finder: PathFinder,
        token_metadata: Arc<dyn TokenMetadataSource>,
        gas_oracle: Arc<GasOracle>,
        impact: PriceImpactEstimator,
    ) -> Self {
        Self {
            path_finder,
            token_metadata,
            gas_oracle,
            impact,
            adapters: HashMap::new(),
        }
    }

    pub fn register_adapter(&mut self, chain: impl Into<String>, adapter: Arc<dyn RouterAdapter>) {
        self.adapters.entry(chain.into()).or_default().push(adapter);
    }

    pub fn adapters(&self, chain: &str) -> &[Arc<dyn RouterAdapter>] {
        self.adapters.get(chain).map(Vec::as_slice).unwrap_or_default()
    }

    /// Best quote for swapping `amount_in` of `token_in` into `token_out`.
    ///
    /// Adapter failures are logged and skipped. `NoQuoteAvailable` is only
    /// returned when every adapter failed.
    #[instrument(skip(self, chain), fields(chain = %chain.name), err)]
    pub async fn get_best_quote(
        &self,
        chain: &ChainDescriptor,
        token_in: Address,
        token_out: Address,
        amount_in: Decimal,
        slippage_bps: u32,
    ) -> ServiceResult<SwapQuote> {
        if slippage_bps > BPS_DENOMINATOR {
            return Err(EngineError::InvalidSlippage(slippage_bps));
        }
        if amount_in <= Decimal::ZERO {
            return Err(EngineError::InvalidAmount(format!("Amount must be positive: {amount_in}")));
        }

        let adapters = self.adapters(&chain.name);
        if adapters.is_empty() {
            return Err(EngineError::NoQuoteAvailable {
                chain: chain.name.clone(),
                reason: "no routers configured".to_string(),
            });
        }

        let path = self
            .path_finder
            .find_path(chain, token_in, token_out)
            .await
            .ok_or_else(|| EngineError::NoRouteFound {
                chain: chain.name.clone(),
                token_in: token_in.to_string(),
                token_out: token_out.to_string(),
            })?;
        if path.is_assumed() {
            tracing::warn!("Quoting on an unverified path: {:?}", path.tokens());
        }

        let (decimals_in, decimals_out) = tokio::try_join!(
            self.token_metadata.get_decimals(&chain.name, token_in),
            self.token_metadata.get_decimals(&chain.name, token_out),
        )?;

        let amount_in_raw = decimal_to_u256(amount_in, decimals_in)?;
        if amount_in_raw.is_zero() {
            return Err(EngineError::InvalidAmount(format!(
                "{amount_in} is below the smallest unit of a {decimals_in}-decimal token"
            )));
        }

        let request = AdapterRequest {
            path,
            amount_in,
            amount_in_raw,
            decimals_in,
            decimals_out,
            slippage_bps,
        };

        let quotes = join_all(adapters.iter().map(|adapter| {
            let request = &request;
            async move { (Arc::clone(adapter), adapter.get_quote(chain, request).await) }
        }));
        let (results, gas) = tokio::join!(quotes, self.gas_oracle.snapshot(chain));

        let mut successes = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (adapter, result) in results {
            match result {
                Ok(quote) => successes.push((adapter, quote)),
                Err(e) => {
                    tracing::warn!(
                        "Router {} failed to quote on {}: {}",
                        adapter.name(),
                        chain.name,
                        e
                    );
                    failures.push(format!("{}: {}", adapter.name(), e));
                }
            }
        }

        let Some((adapter, best)) = select_best(successes) else {
            return Err(EngineError::NoQuoteAvailable {
                chain: chain.name.clone(),
                reason: failures.join("; "),
            });
        };

        let impact = self.impact.estimate(adapter.as_ref(), chain, &request, &best).await;

        tracing::info!(
            "Best quote on {} via {}: {} -> {} (min {}, impact {} bps)",
            chain.name,
            best.router,
            best.amount_in,
            best.output_amount,
            best.minimum_output,
            impact.bps()
        );

        SwapQuote::new(chain, best, &gas, slippage_bps, impact)
    }
}

/// Greatest output wins; equal outputs go to the lower gas estimate.
fn select_best<A>(quotes: Vec<(A, RouterQuote)>) -> Option<(A, RouterQuote)> {
    let mut best: Option<(A, RouterQuote)> = None;

    for (adapter, quote) in quotes {
        let better = match &best {
            None => true,
            Some((_, current)) => {
                quote.output_amount_raw > current.output_amount_raw
                    || (quote.output_amount_raw == current.output_amount_raw
                        && quote.gas.units() < current.gas.units())
            }
        };
        if better {
            best = Some((adapter, quote));
        }
    }

    best
}
