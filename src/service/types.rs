use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::ChainConfig;
use crate::repository::ReceiptSummary;
use crate::service::impact::PriceImpact;
use crate::service::router::RouterQuote;
use crate::service::utils::{gwei_to_wei, u256_to_decimal, wei_to_gwei};
use crate::service::{EngineError, ServiceResult};

/// Static description of a supported chain, built once from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainDescriptor {
    pub name: String,
    pub chain_id: u64,
    pub native_symbol: String,
    pub native_decimals: u8,
    pub default_gas_limit: u64,
    pub block_time: Duration,
    pub wrapped_native: Address,
    pub reference_stable: Address,
    /// Floor for the priority fee of every gas snapshot, in wei.
    pub min_priority_fee_wei: u128,
    pub fallback_gas: FallbackGas,
}

/// Gas constants used when the chain cannot be queried, in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackGas {
    pub base_fee_wei: u128,
    pub priority_fee_wei: u128,
    pub gas_price_wei: u128,
}

impl ChainDescriptor {
    pub fn from_config(config: &ChainConfig) -> ServiceResult<Self> {
        Ok(Self {
            name: config.name.clone(),
            chain_id: config.chain_id,
            native_symbol: config.native_symbol.clone(),
            native_decimals: config.native_decimals,
            default_gas_limit: config.default_gas_limit,
            block_time: Duration::from_secs(config.block_time_secs),
            wrapped_native: config.wrapped_native,
            reference_stable: config.reference_stable,
            min_priority_fee_wei: gwei_to_wei(config.min_priority_fee_gwei)?,
            fallback_gas: FallbackGas {
                base_fee_wei: gwei_to_wei(config.fallback_gas.base_fee_gwei)?,
                priority_fee_wei: gwei_to_wei(config.fallback_gas.priority_fee_gwei)?,
                gas_price_wei: gwei_to_wei(config.fallback_gas.gas_price_gwei)?,
            },
        })
    }
}

/// Where a gas snapshot's numbers came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GasSource {
    Live,
    Fallback,
}

/// Fee levels of a chain at one point in time.
///
/// The gwei fields are exact decimal renderings of the wei fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GasSnapshot {
    pub chain: String,
    pub base_fee_gwei: Decimal,
    pub priority_fee_gwei: Decimal,
    pub gas_price_gwei: Decimal,
    pub base_fee_wei: u128,
    pub priority_fee_wei: u128,
    pub gas_price_wei: u128,
    /// Block the base fee was read from. `None` for fallback snapshots.
    pub block_number: Option<u64>,
    pub captured_at: DateTime<Utc>,
    pub source: GasSource,
}

impl GasSnapshot {
    /// Snapshot from live chain data. The composite gas price is base fee plus priority fee.
    pub fn live(
        chain: &ChainDescriptor,
        block_number: u64,
        base_fee_wei: u128,
        priority_fee_wei: u128,
    ) -> Self {
        let priority_fee_wei = priority_fee_wei.max(chain.min_priority_fee_wei);
        let gas_price_wei = base_fee_wei.saturating_add(priority_fee_wei);

        Self::from_wei(
            chain,
            base_fee_wei,
            priority_fee_wei,
            gas_price_wei,
            Some(block_number),
            GasSource::Live,
        )
    }

    /// Conservative snapshot built from the chain's configured constants.
    pub fn fallback(chain: &ChainDescriptor) -> Self {
        let fallback = chain.fallback_gas;
        let priority_fee_wei = fallback.priority_fee_wei.max(chain.min_priority_fee_wei);
        let gas_price_wei = fallback
            .gas_price_wei
            .max(fallback.base_fee_wei.saturating_add(priority_fee_wei));

        Self::from_wei(
            chain,
            fallback.base_fee_wei,
            priority_fee_wei,
            gas_price_wei,
            None,
            GasSource::Fallback,
        )
    }

    fn from_wei(
        chain: &ChainDescriptor,
        base_fee_wei: u128,
        priority_fee_wei: u128,
        gas_price_wei: u128,
        block_number: Option<u64>,
        source: GasSource,
    ) -> Self {
        Self {
            chain: chain.name.clone(),
            base_fee_gwei: wei_to_gwei(base_fee_wei),
            priority_fee_gwei: wei_to_gwei(priority_fee_wei),
            gas_price_gwei: wei_to_gwei(gas_price_wei),
            base_fee_wei,
            priority_fee_wei,
            gas_price_wei,
            block_number,
            captured_at: Utc::now(),
            source,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source == GasSource::Fallback
    }

    /// `gas_units * gas_price`, in wei.
    pub fn cost_wei(&self, gas_units: u64) -> U256 {
        U256::from(gas_units).saturating_mul(U256::from(self.gas_price_wei))
    }
}

/// Hop sequence of a swap.
///
/// Always at least two tokens, never the same token twice in a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapPath {
    tokens: Vec<Address>,
    /// At least one leg was not confirmed by the pair registry.
    assumed: bool,
}

impl SwapPath {
    pub fn new(tokens: Vec<Address>) -> Option<Self> {
        if tokens.len() < 2 || tokens.windows(2).any(|pair| pair[0] == pair[1]) {
            return None;
        }
        Some(Self {
            tokens,
            assumed: false,
        })
    }

    pub fn direct(token_in: Address, token_out: Address) -> Option<Self> {
        Self::new(vec![token_in, token_out])
    }

    pub fn via(token_in: Address, intermediate: Address, token_out: Address) -> Option<Self> {
        Self::new(vec![token_in, intermediate, token_out])
    }

    pub fn with_assumed(mut self, assumed: bool) -> Self {
        self.assumed = assumed;
        self
    }

    pub fn tokens(&self) -> &[Address] {
        &self.tokens
    }

    pub fn token_in(&self) -> Address {
        self.tokens[0]
    }

    pub fn token_out(&self) -> Address {
        self.tokens[self.tokens.len() - 1]
    }

    pub fn hops(&self) -> usize {
        self.tokens.len() - 1
    }

    pub fn is_assumed(&self) -> bool {
        self.assumed
    }
}

/// Gas units for executing a quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "source", content = "units", rename_all = "lowercase")]
pub enum GasEstimate {
    /// Returned by `eth_estimateGas` for the router call.
    Estimated(u64),
    /// The chain's default gas limit plus a 20% buffer.
    Fallback(u64),
}

impl GasEstimate {
    pub fn fallback(default_gas_limit: u64) -> Self {
        Self::Fallback(default_gas_limit.saturating_mul(120) / 100)
    }

    pub fn units(&self) -> u64 {
        match self {
            Self::Estimated(units) | Self::Fallback(units) => *units,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

/// The best quote for a swap across every router of a chain.
#[derive(Debug, Clone, Serialize)]
pub struct SwapQuote {
    pub chain: String,
    pub router: String,
    pub path: SwapPath,
    pub amount_in: Decimal,
    pub amount_in_raw: U256,
    pub output_amount: Decimal,
    pub output_amount_raw: U256,
    pub minimum_output: Decimal,
    pub minimum_output_raw: U256,
    pub gas: GasEstimate,
    pub gas_price_gwei: Decimal,
    /// Estimated execution cost in the chain's native asset.
    pub gas_cost_native: Decimal,
    pub gas_source: GasSource,
    pub slippage_bps: u32,
    pub price_impact: PriceImpact,
    pub created_at: DateTime<Utc>,
}

impl SwapQuote {
    pub fn new(
        chain: &ChainDescriptor,
        quote: RouterQuote,
        gas: &GasSnapshot,
        slippage_bps: u32,
        price_impact: PriceImpact,
    ) -> ServiceResult<Self> {
        let gas_cost_native =
            u256_to_decimal(gas.cost_wei(quote.gas.units()), chain.native_decimals)?;

        Ok(Self {
            chain: chain.name.clone(),
            router: quote.router,
            path: quote.path,
            amount_in: quote.amount_in,
            amount_in_raw: quote.amount_in_raw,
            output_amount: quote.output_amount,
            output_amount_raw: quote.output_amount_raw,
            minimum_output: quote.minimum_output,
            minimum_output_raw: quote.minimum_output_raw,
            gas: quote.gas,
            gas_price_gwei: gas.gas_price_gwei,
            gas_cost_native,
            gas_source: gas.source,
            slippage_bps,
            price_impact,
            created_at: Utc::now(),
        })
    }

    pub fn price_impact_bps(&self) -> u32 {
        self.price_impact.bps()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
    /// No receipt before the deadline. The transaction may still be mined later.
    Timeout,
}

/// Lifecycle of one submitted transaction. Terminal once it leaves `Pending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionRecord {
    chain: String,
    hash: B256,
    block_number: Option<u64>,
    gas_used: Option<u64>,
    status: TxStatus,
    error: Option<String>,
    submitted_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub(crate) fn pending(chain: impl Into<String>, hash: B256) -> Self {
        Self {
            chain: chain.into(),
            hash,
            block_number: None,
            gas_used: None,
            status: TxStatus::Pending,
            error: None,
            submitted_at: Utc::now(),
        }
    }

    /// Applies a mined receipt. Ignored once the record is terminal.
    pub(crate) fn apply_receipt(&mut self, receipt: &ReceiptSummary) {
        if self.is_terminal() {
            return;
        }

        self.block_number = receipt.block_number;
        self.gas_used = receipt.gas_used;
        if receipt.success {
            self.status = TxStatus::Confirmed;
        } else {
            self.status = TxStatus::Failed;
            self.error = Some("execution reverted".to_string());
        }
    }

    pub(crate) fn mark_timed_out(&mut self, waited: Duration) {
        if self.is_terminal() {
            return;
        }

        self.status = TxStatus::Timeout;
        self.error = Some(format!("no receipt after {}s", waited.as_secs()));
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    pub fn hash(&self) -> B256 {
        self.hash
    }

    pub fn block_number(&self) -> Option<u64> {
        self.block_number
    }

    pub fn gas_used(&self) -> Option<u64> {
        self.gas_used
    }

    pub fn status(&self) -> TxStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status != TxStatus::Pending
    }

    /// Turns a non-confirmed outcome into the matching error.
    pub fn ensure_confirmed(self) -> ServiceResult<Self> {
        let hash = self.hash.to_string();
        match self.status {
            TxStatus::Confirmed => Ok(self),
            TxStatus::Timeout => Err(EngineError::TransactionTimeout { hash }),
            TxStatus::Failed => Err(EngineError::TransactionFailed {
                hash,
                reason: self.error.unwrap_or_else(|| "unknown".to_string()),
            }),
            TxStatus::Pending => Err(EngineError::InternalError(format!(
                "Transaction {hash} is still pending"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceResponse {
    pub chain: String,
    pub address: Address,
    /// Token contract, `None` for the native asset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<Address>,
    /// Raw balance value
    pub balance: String,
    /// Balance formatted with proper decimals
    pub formatted_balance: String,
    pub decimals: u8,
    pub symbol: String,
}
