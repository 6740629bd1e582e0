//! `ChainReader` over a JSON-RPC HTTP endpoint
//!
//! A range read is a JSON-RPC batch of `eth_call`s, one per block and pinned
//! to that block, split into batches of at most `max_concurrent` calls.
//! Responses keep block order.

use alloy_eips::{BlockId, BlockNumberOrTag};
use alloy_primitives::{Address, Bytes};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_client::{ClientBuilder, RpcClient};
use alloy_rpc_types::{Filter, Log, TransactionRequest};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::time::Instant;
use tracing::debug;

use super::chain::{ChainReader, LogQuery};
use crate::error::{Result, SnapshotError};
use crate::models::EpochRange;

pub struct RpcChainReader {
    rpc_url: String,
    max_concurrent: usize,
}

impl RpcChainReader {
    pub fn new(rpc_url: impl Into<String>, max_concurrent: usize) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            max_concurrent: max_concurrent.max(1),
        }
    }

    fn provider(&self) -> Result<impl Provider> {
        let url = self
            .rpc_url
            .parse()
            .map_err(|_| SnapshotError::configuration(format!("invalid RPC url: {}", self.rpc_url)))?;
        Ok(ProviderBuilder::new().connect_http(url))
    }

    fn client(&self) -> Result<RpcClient> {
        let url = self
            .rpc_url
            .parse()
            .map_err(|_| SnapshotError::configuration(format!("invalid RPC url: {}", self.rpc_url)))?;
        Ok(ClientBuilder::default().http(url))
    }
}

impl ChainReader for RpcChainReader {
    async fn call(&self, to: Address, calldata: Bytes, block: Option<u64>) -> Result<Bytes> {
        let provider = self.provider()?;
        let tx = TransactionRequest::default().to(to).input(calldata.into());
        let block = block.map(BlockId::number).unwrap_or_else(BlockId::latest);

        Ok(provider.call(tx).block(block).await?)
    }

    async fn call_on_block_range(
        &self,
        to: Address,
        calldata: Bytes,
        range: EpochRange,
    ) -> Result<Vec<Option<Bytes>>> {
        let client = self.client()?;
        let tx = TransactionRequest::default().to(to).input(calldata.into());
        let started = Instant::now();
        let blocks: Vec<u64> = range.blocks().collect();

        let mut outputs = Vec::with_capacity(blocks.len());
        for chunk in blocks.chunks(self.max_concurrent) {
            let mut batch = client.new_batch();
            let waiters = chunk
                .iter()
                .map(|block| {
                    batch.add_call::<_, Bytes>("eth_call", &(tx.clone(), BlockId::number(*block)))
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;
            batch.send().await?;

            for waiter in waiters {
                let output = waiter.await?;
                // Empty output: no contract code at this height
                outputs.push((!output.is_empty()).then_some(output));
            }
        }

        debug!(
            "eth_call {} x{} blocks ({}) in {} batches, {:?}",
            to,
            outputs.len(),
            range,
            blocks.len().div_ceil(self.max_concurrent),
            started.elapsed()
        );
        Ok(outputs)
    }

    async fn block_timestamps(&self, range: EpochRange) -> Result<Vec<Option<u64>>> {
        let provider = self.provider()?;

        stream::iter(range.blocks())
            .map(|block| {
                let provider = &provider;
                async move {
                    let header = provider
                        .get_block_by_number(BlockNumberOrTag::Number(block))
                        .await?;
                    Ok::<_, SnapshotError>(
                        header
                            .map(|b| b.header.timestamp)
                            .filter(|timestamp| *timestamp > 0),
                    )
                }
            })
            .buffered(self.max_concurrent)
            .try_collect()
            .await
    }

    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<Log>> {
        let provider = self.provider()?;
        let filter = Filter::new()
            .address(query.address)
            .event_signature(query.event_signature)
            .topic1(query.reserve_topic)
            .from_block(query.range.begin())
            .to_block(query.range.end());

        let logs = provider.get_logs(&filter).await?;
        debug!(
            "eth_getLogs {} topic0={} ({}): {} logs",
            query.address,
            query.event_signature,
            query.range,
            logs.len()
        );
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{IPool, AAVE_V3_POOL};
    use crate::sampler::chain::call_once;

    #[test]
    fn test_invalid_url_is_configuration_error() {
        let reader = RpcChainReader::new("not a url", 4);
        let err = tokio_test::block_on(reader.block_timestamps(EpochRange::new(1, 1).unwrap()))
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Configuration(_)));
    }

    #[test]
    fn test_invalid_url_fails_range_read() {
        let reader = RpcChainReader::new("not a url", 4);
        let range = EpochRange::new(1, 3).unwrap();
        let err = tokio_test::block_on(reader.call_on_block_range(Address::ZERO, Bytes::new(), range))
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Configuration(_)));
    }

    #[test]
    fn test_zero_concurrency_is_clamped() {
        let reader = RpcChainReader::new("http://localhost:8545", 0);
        assert_eq!(reader.max_concurrent, 1);
    }

    #[tokio::test]
    async fn test_live_reserves_list() {
        // Requires RPC_URL pointing at an Ethereum mainnet node
        if std::env::var("RPC_URL").is_err() {
            return;
        }

        let rpc_url = std::env::var("RPC_URL").unwrap();
        let reader = RpcChainReader::new(rpc_url, 8);
        let reserves = call_once(
            &reader,
            AAVE_V3_POOL,
            &IPool::getReservesListCall {},
            None,
            "reserves list",
        )
        .await
        .unwrap();
        assert!(!reserves.is_empty());
    }
}
