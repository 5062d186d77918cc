use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{B256, Bytes, keccak256};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::repository::{ChainRepository, ReceiptSummary};
use crate::service::types::TransactionRecord;
use crate::service::{EngineError, ServiceResult};

/// Broadcasts signed transactions and polls for their receipts.
pub struct TransactionTracker {
    repository: Arc<dyn ChainRepository>,
    poll_interval: Duration,
}

impl TransactionTracker {
    pub fn new(repository: Arc<dyn ChainRepository>, poll_interval: Duration) -> Self {
        Self {
            repository,
            poll_interval,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Sends the signed payload and returns a `Pending` record for it.
    #[instrument(skip(self, payload), err)]
    pub async fn broadcast(
        &self,
        chain: &str,
        payload: &Bytes,
    ) -> ServiceResult<TransactionRecord> {
        let local_hash = keccak256(payload);

        let hash = self.repository.send_raw_transaction(chain, payload).await?;
        if hash != local_hash {
            tracing::warn!("Node reported hash {} for payload hashing to {}", hash, local_hash);
        }

        tracing::info!("Broadcast transaction {} on {}", hash, chain);
        Ok(TransactionRecord::pending(chain, hash))
    }

    /// Polls for the receipt of `record` until it is terminal, the deadline
    /// passes or `cancel` fires.
    ///
    /// Cancellation returns the record unchanged (still `Pending`). Receipt
    /// lookup errors are logged and polling continues.
    pub async fn track(
        &self,
        mut record: TransactionRecord,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> TransactionRecord {
        if record.is_terminal() {
            return record;
        }

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::info!("Tracking of {} cancelled", record.hash());
                    return record;
                }
                _ = &mut deadline => {
                    tracing::warn!("Transaction {} timed out after {:?}", record.hash(), timeout);
                    record.mark_timed_out(timeout);
                    return record;
                }
                receipt = self.next_receipt(&mut ticker, record.chain(), record.hash()) => {
                    if let Some(receipt) = receipt {
                        record.apply_receipt(&receipt);
                        tracing::info!(
                            "Transaction {} {:?} in block {:?}, gas used {:?}",
                            record.hash(),
                            record.status(),
                            record.block_number(),
                            record.gas_used()
                        );
                        return record;
                    }
                }
            }
        }
    }

    /// Runs [`track`](Self::track) on its own task.
    pub fn spawn(self: &Arc<Self>, record: TransactionRecord, timeout: Duration) -> TrackingHandle {
        let cancel = CancellationToken::new();
        let hash = record.hash();
        let tracker = Arc::clone(self);
        let token = cancel.clone();

        let task = tokio::spawn(async move { tracker.track(record, timeout, &token).await });

        TrackingHandle { hash, cancel, task }
    }

    async fn next_receipt(
        &self,
        ticker: &mut Interval,
        chain: &str,
        hash: B256,
    ) -> Option<ReceiptSummary> {
        ticker.tick().await;

        match self.repository.transaction_receipt(chain, hash).await {
            Ok(receipt) => {
                if receipt.is_none() {
                    tracing::debug!("Transaction {} still pending", hash);
                }
                receipt
            }
            Err(e) => {
                tracing::warn!("Receipt lookup for {} failed, will retry: {}", hash, e);
                None
            }
        }
    }
}

/// Handle to a tracking task started with [`TransactionTracker::spawn`].
#[derive(Debug)]
pub struct TrackingHandle {
    hash: B256,
    cancel: CancellationToken,
    task: JoinHandle<TransactionRecord>,
}

impl TrackingHandle {
    pub fn hash(&self) -> B256 {
        self.hash
    }

    /// Stops polling. The record keeps its last observed status.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn join(self) -> ServiceResult<TransactionRecord> {
        self.task
            .await
            .map_err(|e| {
                EngineError::InternalError(format!("Tracking task for {} failed: {e}", self.hash))
            })
    }
}
