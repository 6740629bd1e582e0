//! Total-supply processor: per-block reserve state for the selected asset

use alloy_primitives::Address;
use std::sync::Arc;
use tracing::info;

use super::{select_asset, SnapshotProcessor};
use crate::config::Config;
use crate::contracts::known_symbol;
use crate::error::Result;
use crate::models::{EpochDescriptor, TotalSupplySnapshot};
use crate::sampler::{ChainReader, ReserveSampler};

pub struct TotalSupplyProcessor<R> {
    reader: Arc<R>,
    config: Arc<Config>,
}

impl<R: ChainReader> TotalSupplyProcessor<R> {
    pub fn new(reader: Arc<R>, config: Arc<Config>) -> Self {
        Self { reader, config }
    }
}

impl<R: ChainReader> SnapshotProcessor for TotalSupplyProcessor<R> {
    type Snapshot = TotalSupplySnapshot;

    async fn compute(&self, epoch: &EpochDescriptor) -> Result<Vec<(Address, TotalSupplySnapshot)>> {
        let range = epoch.range()?;
        let asset = select_asset(&self.config, epoch)?;
        info!(
            "🔍 Epoch {} [{}]: total supply of {} ({})",
            epoch.epoch_id,
            range,
            known_symbol(&asset).unwrap_or("?"),
            asset
        );

        let sampler = ReserveSampler::new(
            self.reader.clone(),
            self.config.pool_address,
            self.config.oracle_address,
        );
        let snapshot = sampler.sample_reserve_state(asset, range).await?;
        Ok(vec![(asset, snapshot)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{IPoolDataProvider, AAVE_V3_POOL_DATA_PROVIDER};
    use crate::error::SnapshotError;
    use crate::models::{BlockKey, EpochRange};
    use crate::sampler::mock::MockChain;
    use crate::sampler::{call_on_range, RpcChainReader};
    use alloy_primitives::{address, U256};

    const USDC: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");

    fn usdc_only(rpc_url: &str) -> Arc<Config> {
        Arc::new(Config {
            rpc_url: rpc_url.to_string(),
            monitored_assets: vec![USDC],
            ..Config::default()
        })
    }

    fn epoch(begin: u64, end: u64) -> EpochDescriptor {
        EpochDescriptor { begin, end, epoch_id: 7, day: 2 }
    }

    #[tokio::test]
    async fn test_inverted_epoch_rejected_before_any_read() {
        // MockChain panics on any call it has no handler for
        let processor = TotalSupplyProcessor::new(Arc::new(MockChain::new()), usdc_only(""));
        let err = processor.compute(&epoch(20, 10)).await.unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidRange { begin: 20, end: 10 }));
    }

    #[tokio::test]
    async fn test_live_ten_block_epoch() {
        // Requires RPC_URL pointing at an Ethereum mainnet archive node
        if std::env::var("RPC_URL").is_err() {
            return;
        }

        let rpc_url = std::env::var("RPC_URL").unwrap();
        let config = usdc_only(&rpc_url);
        let reader = Arc::new(RpcChainReader::new(&rpc_url, config.max_concurrent_requests));
        let processor = TotalSupplyProcessor::new(reader, config);

        let snapshots = processor.compute(&epoch(19_422_690, 19_422_699)).await.unwrap();

        assert_eq!(snapshots.len(), 1);
        let (asset, snapshot) = &snapshots[0];
        assert_eq!(*asset, USDC);
        assert_eq!(
            snapshot.chain_height_range,
            EpochRange::new(19_422_690, 19_422_699).unwrap()
        );
        assert_eq!(snapshot.total_a_token.len(), 10);
        assert_eq!(snapshot.total_variable_debt.len(), 10);
        assert!(snapshot.timestamp > 1_700_000_000);
        assert!((19_422_690..=19_422_699).all(|b| snapshot.liquidity_index.contains_key(&BlockKey(b))));
    }

    #[tokio::test]
    async fn test_live_debt_matches_data_provider() {
        if std::env::var("RPC_URL").is_err() {
            return;
        }

        let rpc_url = std::env::var("RPC_URL").unwrap();
        let config = usdc_only(&rpc_url);
        let reader = Arc::new(RpcChainReader::new(&rpc_url, config.max_concurrent_requests));
        let range = EpochRange::new(19_420_920, 19_420_929).unwrap();

        let processor = TotalSupplyProcessor::new(reader.clone(), config);
        let snapshots = processor
            .compute(&epoch(range.begin(), range.end()))
            .await
            .unwrap();
        let snapshot = &snapshots[0].1;

        let onchain = call_on_range(
            &*reader,
            AAVE_V3_POOL_DATA_PROVIDER,
            &IPoolDataProvider::getReserveDataCall { asset: USDC },
            range,
            "data provider reserve data",
        )
        .await
        .unwrap();

        let within_two = |a: U256, b: U256| a.abs_diff(b) <= U256::from(2);
        for (block, expected) in range.blocks().zip(onchain) {
            let key = BlockKey(block);
            assert!(
                within_two(snapshot.total_variable_debt[&key].token_debt, expected.totalVariableDebt),
                "variable debt at {block}"
            );
            assert!(
                within_two(snapshot.total_stable_debt[&key].token_debt, expected.totalStableDebt),
                "stable debt at {block}"
            );
        }
    }
}
