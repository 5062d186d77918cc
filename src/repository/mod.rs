pub mod contract;
pub mod error;
pub mod gateway;
pub mod pool;
pub mod transport;

use ::alloy::primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
pub use error::RepositoryError;
pub use gateway::RpcGateway;
pub use pool::EndpointPool;
use serde::Serialize;
pub use transport::http_provider;

pub(crate) type RepoResult<T> = std::result::Result<T, RepositoryError>;

/// Header fields of the latest block that the gas oracle needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: u64,
    /// Absent on chains without EIP-1559.
    pub base_fee_per_gas: Option<u128>,
}

/// The parts of a transaction receipt the lifecycle tracker acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReceiptSummary {
    pub transaction_hash: B256,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
    pub success: bool,
}

/// Typed access to the standard JSON-RPC method set of a chain.
///
/// Every method takes the chain identifier and goes through that chain's
/// endpoint pool, so callers never pick endpoints themselves. Transient
/// endpoint failures are absorbed by rotation; only total exhaustion
/// (`RepositoryError::EndpointExhausted`) or a deterministic answer such as a
/// revert reaches the caller.
#[async_trait]
pub trait ChainRepository: Send + Sync {
    /// `eth_getBlockByNumber("latest", false)`.
    async fn latest_block(&self, chain: &str) -> RepoResult<BlockHeader>;

    /// `eth_gasPrice`, in wei.
    async fn gas_price(&self, chain: &str) -> RepoResult<u128>;

    /// `eth_getBalance(address, "latest")`, in wei.
    async fn balance(&self, chain: &str, address: Address) -> RepoResult<U256>;

    /// `eth_call` against the latest block, returning the raw return data.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let data = IERC20::decimalsCall {}.abi_encode();
    /// let out = repository.call_contract("ethereum", token, data.into()).await?;
    /// ```
    async fn call_contract(&self, chain: &str, to: Address, data: Bytes) -> RepoResult<Bytes>;

    /// `eth_estimateGas` for a call from `from` (or the node's default sender).
    async fn estimate_gas(
        &self,
        chain: &str,
        from: Option<Address>,
        to: Address,
        data: Bytes,
    ) -> RepoResult<u64>;

    /// `eth_sendRawTransaction`, returning the hash reported by the node.
    async fn send_raw_transaction(&self, chain: &str, payload: &Bytes) -> RepoResult<B256>;

    /// `eth_getTransactionReceipt`; `None` while the transaction is not mined.
    async fn transaction_receipt(
        &self,
        chain: &str,
        hash: B256,
    ) -> RepoResult<Option<ReceiptSummary>>;
}
