use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use alloy::primitives::{Address, B256, Bytes, U256, keccak256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::{BlockNumberOrTag, TransactionRequest};
use alloy::transports::TransportResult;
use async_trait::async_trait;
use tracing::instrument;

use super::error::RepositoryError;
use super::pool::EndpointPool;
use super::transport::{RpcFailure, http_provider, is_already_known};
use super::{BlockHeader, ChainRepository, ReceiptSummary, RepoResult};

/// A chain's endpoint pool and one provider per pool URL, in pool order.
struct ChainEndpoints {
    pool: EndpointPool,
    providers: Vec<RootProvider>,
}

/// Chain access that fans one logical call out over a chain's endpoint pool.
#[derive(Default)]
pub struct RpcGateway {
    chains: HashMap<String, ChainEndpoints>,
}

impl RpcGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `chain` with an HTTP provider for every distinct URL.
    pub fn connect_http(
        &mut self,
        chain: &str,
        urls: Vec<String>,
        request_timeout: Duration,
    ) -> RepoResult<()> {
        let pool = EndpointPool::new(chain, urls)?;
        let providers = pool
            .urls()
            .iter()
            .map(|url| http_provider(url, request_timeout))
            .collect::<RepoResult<Vec<_>>>()?;

        self.add_chain(pool, providers)
    }

    /// Registers a pool with its providers. `providers[i]` serves `pool.urls()[i]`.
    pub fn add_chain(
        &mut self,
        pool: EndpointPool,
        providers: Vec<RootProvider>,
    ) -> RepoResult<()> {
        if providers.len() != pool.len() {
            return Err(RepositoryError::Other(format!(
                "chain {} has {} endpoints but {} providers",
                pool.chain(),
                pool.len(),
                providers.len()
            )));
        }

        self.chains.insert(pool.chain().to_string(), ChainEndpoints { pool, providers });
        Ok(())
    }

    pub fn with_chain(
        mut self,
        pool: EndpointPool,
        providers: Vec<RootProvider>,
    ) -> RepoResult<Self> {
        self.add_chain(pool, providers)?;
        Ok(self)
    }

    pub fn pool(&self, chain: &str) -> Option<&EndpointPool> {
        self.chains.get(chain).map(|endpoints| &endpoints.pool)
    }

    /// Runs `op` against `chain`, rotating through the endpoint pool.
    ///
    /// Attempts are strictly sequential and each endpoint is tried at most once
    /// per call, so the worst case is one round-trip per configured endpoint.
    /// Reverts and transaction rejections come back from the first endpoint
    /// that reports them. Fails with `EndpointExhausted` only after every
    /// endpoint has been tried.
    #[instrument(skip(self, op), err)]
    async fn with_rotation<T, F, Fut>(&self, chain: &str, method: &str, op: F) -> RepoResult<T>
    where
        F: Fn(RootProvider) -> Fut,
        Fut: Future<Output = TransportResult<T>>,
    {
        let endpoints = self
            .chains
            .get(chain)
            .ok_or_else(|| RepositoryError::UnknownChain(chain.to_string()))?;
        let pool = &endpoints.pool;

        let mut tried = vec![false; pool.len()];
        let mut attempts = 0;
        let mut last_error: Option<String> = None;

        while let Some((idx, url)) = pool.next_endpoint(&tried) {
            if let Some(slot) = tried.get_mut(idx) {
                *slot = true;
            }
            let Some(provider) = endpoints.providers.get(idx) else {
                continue;
            };
            attempts += 1;

            let err = match op(provider.clone()).await {
                Ok(value) => {
                    pool.mark_succeeded(idx);
                    return Ok(value);
                }
                Err(err) => err,
            };

            match RpcFailure::classify(&err) {
                RpcFailure::Reverted(message) => {
                    pool.mark_succeeded(idx);
                    return Err(RepositoryError::ExecutionReverted(message));
                }
                RpcFailure::Rejected(message) => {
                    pool.mark_succeeded(idx);
                    return Err(RepositoryError::Rejected(message));
                }
                RpcFailure::Endpoint(message) => {
                    tracing::warn!(
                        "RPC endpoint {} ({}) failed for {}: {}",
                        url,
                        chain,
                        method,
                        message
                    );
                    pool.mark_failed(idx);
                    last_error = Some(message);
                }
            }
        }

        Err(RepositoryError::EndpointExhausted {
            chain: chain.to_string(),
            attempts,
            last_error: last_error.unwrap_or_else(|| "no endpoint attempted".to_string()),
        })
    }
}

#[async_trait]
impl ChainRepository for RpcGateway {
    async fn latest_block(&self, chain: &str) -> RepoResult<BlockHeader> {
        let block = self
            .with_rotation(chain, "eth_getBlockByNumber", |provider| async move {
                provider.get_block_by_number(BlockNumberOrTag::Latest).await
            })
            .await?
            .ok_or_else(|| RepositoryError::ParseError("latest block not available".to_string()))?;

        Ok(BlockHeader {
            number: block.header.number,
            base_fee_per_gas: block.header.base_fee_per_gas.map(u128::from),
        })
    }

    async fn gas_price(&self, chain: &str) -> RepoResult<u128> {
        self.with_rotation(chain, "eth_gasPrice", |provider| async move {
            provider.get_gas_price().await
        })
        .await
    }

    async fn balance(&self, chain: &str, address: Address) -> RepoResult<U256> {
        self.with_rotation(chain, "eth_getBalance", |provider| async move {
            provider.get_balance(address).await
        })
        .await
    }

    async fn call_contract(&self, chain: &str, to: Address, data: Bytes) -> RepoResult<Bytes> {
        let tx = TransactionRequest::default().to(to).input(data.into());

        self.with_rotation(chain, "eth_call", |provider| {
            let tx = tx.clone();
            async move {
                provider
                    .call(tx)
                    .block(BlockNumberOrTag::Latest.into())
                    .await
            }
        })
        .await
    }

    async fn estimate_gas(
        &self,
        chain: &str,
        from: Option<Address>,
        to: Address,
        data: Bytes,
    ) -> RepoResult<u64> {
        let mut tx = TransactionRequest::default().to(to).input(data.into());
        if let Some(from) = from {
            tx = tx.from(from);
        }

        self.with_rotation(chain, "eth_estimateGas", |provider| {
            let tx = tx.clone();
            async move { provider.estimate_gas(tx).await }
        })
        .await
    }

    /// A node that already holds the transaction answers for it: the local
    /// keccak256 of the payload is returned and no further endpoint is tried.
    async fn send_raw_transaction(&self, chain: &str, payload: &Bytes) -> RepoResult<B256> {
        let local_hash = keccak256(payload);

        self.with_rotation(chain, "eth_sendRawTransaction", |provider| {
            let payload = payload.clone();
            async move {
                match provider.send_raw_transaction(&payload).await {
                    Ok(pending) => Ok(*pending.tx_hash()),
                    Err(err) if is_already_known(&err) => {
                        tracing::info!("Transaction {} already known to the node", local_hash);
                        Ok(local_hash)
                    }
                    Err(err) => Err(err),
                }
            }
        })
        .await
    }

    async fn transaction_receipt(
        &self,
        chain: &str,
        hash: B256,
    ) -> RepoResult<Option<ReceiptSummary>> {
        let receipt = self
            .with_rotation(chain, "eth_getTransactionReceipt", |provider| async move {
                provider.get_transaction_receipt(hash).await
            })
            .await?;

        Ok(receipt.map(|receipt| ReceiptSummary {
            transaction_hash: hash,
            block_number: receipt.block_number,
            gas_used: Some(receipt.gas_used),
            success: receipt.status(),
        }))
    }
}
