//! Hand-written doubles for the engine's collaborator traits.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use alloy::primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::repository::{BlockHeader, ChainRepository, ReceiptSummary, RepositoryError};
use crate::service::path::PairRegistry;
use crate::service::router::{AdapterRequest, RouterAdapter, RouterQuote};
use crate::service::token_registry::TokenMetadataSource;
use crate::service::types::{ChainDescriptor, FallbackGas, GasEstimate};
use crate::service::utils::decimal_to_u256;
use crate::service::{EngineError, ServiceResult};

type RepoResult<T> = Result<T, RepositoryError>;

pub fn test_chain() -> ChainDescriptor {
    ChainDescriptor {
        name: "testnet".to_string(),
        chain_id: 31337,
        native_symbol: "ETH".to_string(),
        native_decimals: 18,
        default_gas_limit: 200_000,
        block_time: Duration::from_secs(12),
        wrapped_native: Address::repeat_byte(0xee),
        reference_stable: Address::repeat_byte(0xcc),
        min_priority_fee_wei: 1_000_000_000,
        fallback_gas: FallbackGas {
            base_fee_wei: 30_000_000_000,
            priority_fee_wei: 2_000_000_000,
            gas_price_wei: 35_000_000_000,
        },
    }
}

/// Repository returning configured results and counting calls.
pub struct MockRepository {
    latest_block: Mutex<RepoResult<BlockHeader>>,
    gas_price: Mutex<RepoResult<u128>>,
    balance: Mutex<RepoResult<U256>>,
    call_results: Mutex<HashMap<Address, RepoResult<Bytes>>>,
    estimate_gas: Mutex<RepoResult<u64>>,
    send_result: Mutex<RepoResult<B256>>,
    receipts: Mutex<VecDeque<RepoResult<Option<ReceiptSummary>>>>,
    contract_calls: AtomicUsize,
    gas_estimates: AtomicUsize,
    receipt_polls: AtomicUsize,
}

impl MockRepository {
    pub fn new() -> Self {
        Self {
            latest_block: Mutex::new(Ok(BlockHeader {
                number: 1,
                base_fee_per_gas: Some(20_000_000_000),
            })),
            gas_price: Mutex::new(Ok(22_000_000_000)),
            balance: Mutex::new(Ok(U256::ZERO)),
            call_results: Mutex::new(HashMap::new()),
            estimate_gas: Mutex::new(Ok(150_000)),
            send_result: Mutex::new(Ok(B256::ZERO)),
            receipts: Mutex::new(VecDeque::new()),
            contract_calls: AtomicUsize::new(0),
            gas_estimates: AtomicUsize::new(0),
            receipt_polls: AtomicUsize::new(0),
        }
    }

    pub fn set_latest_block(&self, result: RepoResult<BlockHeader>) {
        *self.latest_block.lock().unwrap() = result;
    }

    pub fn set_gas_price(&self, result: RepoResult<u128>) {
        *self.gas_price.lock().unwrap() = result;
    }

    pub fn set_balance(&self, result: RepoResult<U256>) {
        *self.balance.lock().unwrap() = result;
    }

    pub fn set_call_result(&self, to: Address, result: RepoResult<Bytes>) {
        self.call_results.lock().unwrap().insert(to, result);
    }

    pub fn set_estimate_gas(&self, result: RepoResult<u64>) {
        *self.estimate_gas.lock().unwrap() = result;
    }

    pub fn set_send_result(&self, result: RepoResult<B256>) {
        *self.send_result.lock().unwrap() = result;
    }

    /// Queues one answer for `transaction_receipt`. An empty queue answers "not mined".
    pub fn push_receipt(&self, result: RepoResult<Option<ReceiptSummary>>) {
        self.receipts.lock().unwrap().push_back(result);
    }

    pub fn call_count(&self) -> usize {
        self.contract_calls.load(Ordering::SeqCst)
    }

    pub fn estimate_count(&self) -> usize {
        self.gas_estimates.load(Ordering::SeqCst)
    }

    pub fn receipt_polls(&self) -> usize {
        self.receipt_polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainRepository for MockRepository {
    async fn latest_block(&self, _chain: &str) -> RepoResult<BlockHeader> {
        self.latest_block.lock().unwrap().clone()
    }

    async fn gas_price(&self, _chain: &str) -> RepoResult<u128> {
        self.gas_price.lock().unwrap().clone()
    }

    async fn balance(&self, _chain: &str, _address: Address) -> RepoResult<U256> {
        self.balance.lock().unwrap().clone()
    }

    async fn call_contract(&self, _chain: &str, to: Address, _data: Bytes) -> RepoResult<Bytes> {
        self.contract_calls.fetch_add(1, Ordering::SeqCst);
        self.call_results
            .lock()
            .unwrap()
            .get(&to)
            .cloned()
            .unwrap_or_else(|| {
                Err(RepositoryError::ContractError(format!("no mock result for {to}")))
            })
    }

    async fn estimate_gas(
        &self,
        _chain: &str,
        _from: Option<Address>,
        _to: Address,
        _data: Bytes,
    ) -> RepoResult<u64> {
        self.gas_estimates.fetch_add(1, Ordering::SeqCst);
        self.estimate_gas.lock().unwrap().clone()
    }

    async fn send_raw_transaction(&self, _chain: &str, _payload: &Bytes) -> RepoResult<B256> {
        self.send_result.lock().unwrap().clone()
    }

    async fn transaction_receipt(
        &self,
        _chain: &str,
        _hash: B256,
    ) -> RepoResult<Option<ReceiptSummary>> {
        self.receipt_polls.fetch_add(1, Ordering::SeqCst);
        self.receipts.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }
}

/// Router that quotes `amount_in * rate`.
pub struct MockAdapter {
    name: String,
    rate: Decimal,
    gas: u64,
    delay: Option<Duration>,
    fail_below: Option<Decimal>,
    always_fail: bool,
    requests: Mutex<Vec<U256>>,
    full_quotes: AtomicUsize,
}

impl MockAdapter {
    pub fn new(name: &str, rate: Decimal) -> Self {
        Self {
            name: name.to_string(),
            rate,
            gas: 150_000,
            delay: None,
            fail_below: None,
            always_fail: false,
            requests: Mutex::new(Vec::new()),
            full_quotes: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            always_fail: true,
            ..Self::new(name, Decimal::ZERO)
        }
    }

    pub fn with_gas(mut self, gas: u64) -> Self {
        self.gas = gas;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fails every request with an input below `threshold`.
    pub fn failing_below(mut self, threshold: Decimal) -> Self {
        self.fail_below = Some(threshold);
        self
    }

    /// Inputs of every quote, full or output-only, in call order.
    pub fn requested_amounts(&self) -> Vec<U256> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of `get_quote` calls, i.e. quotes that include a gas estimate.
    pub fn full_quote_count(&self) -> usize {
        self.full_quotes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RouterAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn quote_amount_out(
        &self,
        _chain: &ChainDescriptor,
        request: &AdapterRequest,
    ) -> ServiceResult<U256> {
        self.requests.lock().unwrap().push(request.amount_in_raw);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.always_fail {
            return Err(EngineError::CallReverted(format!("{} has no pool", self.name)));
        }
        if self.fail_below.is_some_and(|threshold| request.amount_in < threshold) {
            return Err(EngineError::InsufficientLiquidity(format!(
                "{} amount too small",
                self.name
            )));
        }

        decimal_to_u256(request.amount_in * self.rate, request.decimals_out)
    }

    async fn get_quote(
        &self,
        chain: &ChainDescriptor,
        request: &AdapterRequest,
    ) -> ServiceResult<RouterQuote> {
        self.full_quotes.fetch_add(1, Ordering::SeqCst);
        let output = self.quote_amount_out(chain, request).await?;
        RouterQuote::new(&self.name, request, output, GasEstimate::Estimated(self.gas))
    }
}

/// Pair registry over a fixed set of unordered pairs.
#[derive(Default)]
pub struct StaticPairRegistry {
    pairs: HashSet<(Address, Address)>,
    unavailable: bool,
}

impl StaticPairRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn with_pair(mut self, a: Address, b: Address) -> Self {
        self.pairs.insert(Self::key(a, b));
        self
    }

    fn key(a: Address, b: Address) -> (Address, Address) {
        if a < b { (a, b) } else { (b, a) }
    }
}

#[async_trait]
impl PairRegistry for StaticPairRegistry {
    async fn pair_exists(
        &self,
        _chain: &str,
        token_a: Address,
        token_b: Address,
    ) -> ServiceResult<bool> {
        if self.unavailable {
            return Err(EngineError::BlockchainError("pair index lagging".to_string()));
        }
        Ok(self.pairs.contains(&Self::key(token_a, token_b)))
    }
}

/// Token metadata with fixed decimals, 18 for unknown tokens.
#[derive(Default)]
pub struct StaticTokenMetadata {
    decimals: HashMap<Address, u8>,
}

impl StaticTokenMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decimals(mut self, token: Address, decimals: u8) -> Self {
        self.decimals.insert(token, decimals);
        self
    }
}

#[async_trait]
impl TokenMetadataSource for StaticTokenMetadata {
    async fn get_decimals(&self, _chain: &str, token: Address) -> ServiceResult<u8> {
        Ok(self.decimals.get(&token).copied().unwrap_or(18))
    }
}
