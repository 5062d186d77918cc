use std::sync::Arc;

use tracing::instrument;

use crate::repository::ChainRepository;
use crate::service::ServiceResult;
use crate::service::types::{ChainDescriptor, GasSnapshot};

/// Priority fee implied by the node's suggested gas price, floored at the chain minimum.
pub fn derive_priority_fee(gas_price: u128, base_fee: u128, min_priority_fee: u128) -> u128 {
    gas_price.saturating_sub(base_fee).max(min_priority_fee)
}

/// Derives fee levels from the latest block and the node's gas price.
pub struct GasOracle {
    repository: Arc<dyn ChainRepository>,
}

impl GasOracle {
    pub fn new(repository: Arc<dyn ChainRepository>) -> Self {
        Self { repository }
    }

    /// Never fails: if the chain cannot be read, the chain's fallback constants are returned.
    pub async fn snapshot(&self, chain: &ChainDescriptor) -> GasSnapshot {
        match self.live_snapshot(chain).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(
                    "Gas oracle falling back to configured constants for {}: {}",
                    chain.name,
                    e
                );
                GasSnapshot::fallback(chain)
            }
        }
    }

    #[instrument(skip(self, chain), fields(chain = %chain.name))]
    async fn live_snapshot(&self, chain: &ChainDescriptor) -> ServiceResult<GasSnapshot> {
        let (block, gas_price) = tokio::try_join!(
            self.repository.latest_block(&chain.name),
            self.repository.gas_price(&chain.name),
        )?;

        // Chains without EIP-1559 report no base fee.
        let base_fee = block.base_fee_per_gas.unwrap_or(0);
        let priority_fee = derive_priority_fee(gas_price, base_fee, chain.min_priority_fee_wei);

        tracing::debug!(
            "Gas on {} at block {}: base={} priority={} node_price={}",
            chain.name,
            block.number,
            base_fee,
            priority_fee,
            gas_price
        );

        Ok(GasSnapshot::live(chain, block.number, base_fee, priority_fee))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{BlockHeader, RepositoryError};
    use crate::service::testing::{MockRepository, test_chain};
    use crate::service::types::GasSource;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn test_derive_priority_fee_has_min_floor() {
        let floor = 1_000_000_000;
        assert_eq!(derive_priority_fee(32_000_000_000, 30_000_000_000, floor), 2_000_000_000);
        assert_eq!(derive_priority_fee(30_100_000_000, 30_000_000_000, floor), floor);
        // Node price below base fee
        assert_eq!(derive_priority_fee(10, 20, 5), 5);
    }

    #[tokio::test]
    async fn test_live_snapshot_should_work() {
        let chain = test_chain();
        let repository = Arc::new(MockRepository::new());
        repository.set_latest_block(Ok(BlockHeader {
            number: 19_000_000,
            base_fee_per_gas: Some(30_000_000_000),
        }));
        repository.set_gas_price(Ok(32_500_000_000));
        let oracle = GasOracle::new(repository);

        let snapshot = oracle.snapshot(&chain).await;

        assert_eq!(snapshot.source, GasSource::Live);
        assert_eq!(snapshot.block_number, Some(19_000_000));
        assert_eq!(snapshot.base_fee_gwei, Decimal::from(30));
        assert_eq!(snapshot.priority_fee_gwei, Decimal::from_str("2.5").unwrap());
        assert_eq!(snapshot.gas_price_gwei, Decimal::from_str("32.5").unwrap());
    }

    #[tokio::test]
    async fn test_pre_eip1559_chain_uses_zero_base_fee() {
        let chain = test_chain();
        let repository = Arc::new(MockRepository::new());
        repository.set_latest_block(Ok(BlockHeader {
            number: 42,
            base_fee_per_gas: None,
        }));
        repository.set_gas_price(Ok(5_000_000_000));
        let oracle = GasOracle::new(repository);

        let snapshot = oracle.snapshot(&chain).await;

        assert_eq!(snapshot.base_fee_wei, 0);
        assert_eq!(snapshot.priority_fee_wei, 5_000_000_000);
        assert_eq!(snapshot.gas_price_wei, 5_000_000_000);
    }

    #[tokio::test]
    async fn test_rpc_failure_returns_fallback() {
        let chain = test_chain();
        let repository = Arc::new(MockRepository::new());
        repository.set_gas_price(Err(RepositoryError::EndpointExhausted {
            chain: chain.name.clone(),
            attempts: 3,
            last_error: "timeout".to_string(),
        }));
        let oracle = GasOracle::new(repository);

        let snapshot = oracle.snapshot(&chain).await;

        assert_eq!(snapshot.source, GasSource::Fallback);
        assert_eq!(
            snapshot,
            GasSnapshot {
                captured_at: snapshot.captured_at,
                ..GasSnapshot::fallback(&chain)
            }
        );
    }
}
