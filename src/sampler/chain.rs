//! Chain access seam
//!
//! Samplers never talk to a node directly. They go through `ChainReader`,
//! which the node wires to a real RPC endpoint (`RpcChainReader`) and tests
//! wire to an in-memory chain.

use alloy_primitives::{Address, Bytes, B256};
use alloy_rpc_types::Log;
use alloy_sol_types::SolCall;
use tracing::trace;

use crate::error::{Result, SnapshotError};
use crate::models::EpochRange;

/// Log filter: one contract, one event signature, one asset in topic 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogQuery {
    pub address: Address,
    pub event_signature: B256,
    pub reserve_topic: B256,
    pub range: EpochRange,
}

/// Read-only access to finalized chain state.
///
/// Range reads return one slot per block of the range, in block order.
/// `None` marks a block the node did not answer for.
#[allow(async_fn_in_trait)]
pub trait ChainReader: Send + Sync {
    /// Single `eth_call`, at `block` or at the latest block.
    async fn call(&self, to: Address, calldata: Bytes, block: Option<u64>) -> Result<Bytes>;

    /// The same `eth_call` evaluated at every block of `range`.
    async fn call_on_block_range(
        &self,
        to: Address,
        calldata: Bytes,
        range: EpochRange,
    ) -> Result<Vec<Option<Bytes>>>;

    /// Header timestamp of every block of `range`.
    async fn block_timestamps(&self, range: EpochRange) -> Result<Vec<Option<u64>>>;

    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<Log>>;
}

/// Evaluate `call` at every block of `range` and decode the results.
///
/// A missing or short response fails the whole read: a snapshot is never
/// built from a partial range.
pub async fn call_on_range<R, C>(
    reader: &R,
    to: Address,
    call: &C,
    range: EpochRange,
    metric: &'static str,
) -> Result<Vec<C::Return>>
where
    R: ChainReader + ?Sized,
    C: SolCall,
{
    let raw = reader
        .call_on_block_range(to, Bytes::from(call.abi_encode()), range)
        .await?;

    if raw.len() != range.len() {
        let block = if raw.len() < range.len() {
            range.begin() + raw.len() as u64
        } else {
            range.end()
        };
        return Err(SnapshotError::DataUnavailable { metric, block });
    }

    trace!("{}: {} responses for {}", metric, raw.len(), range);

    range
        .blocks()
        .zip(raw)
        .map(|(block, output)| {
            let output = output.ok_or(SnapshotError::DataUnavailable { metric, block })?;
            decode::<C>(&output, metric, block)
        })
        .collect()
}

/// Single decoded call, at `block` or at the latest block.
pub async fn call_once<R, C>(
    reader: &R,
    to: Address,
    call: &C,
    block: Option<u64>,
    metric: &'static str,
) -> Result<C::Return>
where
    R: ChainReader + ?Sized,
    C: SolCall,
{
    let output = reader.call(to, Bytes::from(call.abi_encode()), block).await?;
    decode::<C>(&output, metric, block.unwrap_or_default())
}

fn decode<C: SolCall>(output: &[u8], metric: &'static str, block: u64) -> Result<C::Return> {
    if output.is_empty() {
        return Err(SnapshotError::DataUnavailable { metric, block });
    }
    C::abi_decode_returns(output).map_err(|e| SnapshotError::Decode {
        metric,
        block,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::IERC20;
    use crate::sampler::mock::MockChain;
    use alloy_primitives::{address, U256};

    const TOKEN: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");

    #[tokio::test]
    async fn test_call_on_range_decodes_every_block() {
        let chain = MockChain::new().on_call::<IERC20::totalSupplyCall>(TOKEN, |block, _| {
            Some(U256::from(block * 10))
        });
        let range = EpochRange::new(100, 103).unwrap();

        let supplies = call_on_range(&chain, TOKEN, &IERC20::totalSupplyCall {}, range, "supply")
            .await
            .unwrap();

        assert_eq!(supplies.len(), 4);
        assert_eq!(supplies[0], U256::from(1000));
        assert_eq!(supplies[3], U256::from(1030));
    }

    #[tokio::test]
    async fn test_hole_fails_whole_range() {
        let chain = MockChain::new().on_call::<IERC20::totalSupplyCall>(TOKEN, |block, _| {
            (block != 102).then(|| U256::from(1))
        });
        let range = EpochRange::new(100, 103).unwrap();

        let err = call_on_range(&chain, TOKEN, &IERC20::totalSupplyCall {}, range, "supply")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SnapshotError::DataUnavailable { metric: "supply", block: 102 }
        ));
    }

    #[tokio::test]
    async fn test_garbage_output_is_decode_error() {
        let chain = MockChain::new().on_raw(TOKEN, IERC20::totalSupplyCall::SELECTOR, |_, _| {
            Some(vec![0xde, 0xad])
        });

        let err = call_once(&chain, TOKEN, &IERC20::totalSupplyCall {}, Some(7), "supply")
            .await
            .unwrap_err();

        assert!(matches!(err, SnapshotError::Decode { block: 7, .. }));
        assert!(err.is_data_error());
    }
}
