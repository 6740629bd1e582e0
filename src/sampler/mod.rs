//! Chain sampling: prices, reserve state and event volume over block ranges

pub mod chain;
pub mod numeric;
pub mod prices;
pub mod reserve;
pub mod rpc;
pub mod volume;

#[cfg(test)]
pub(crate) mod mock;

pub use chain::{call_on_range, call_once, ChainReader, LogQuery};
pub use prices::PriceSampler;
pub use reserve::{decode_configuration, ReserveSampler};
pub use rpc::RpcChainReader;
pub use volume::{EventCategory, VolumeAggregator};

use alloy_primitives::Address;
use tracing::error;

use crate::models::EpochRange;

/// Current Unix time in seconds.
pub fn wall_clock_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Header timestamp: chain time of the last block, or wall-clock time at the
/// start of the computation when the node did not return one.
pub(crate) fn chain_time_or_wall_clock(
    asset: Address,
    range: EpochRange,
    last_block_time: Option<u64>,
    started_at: u64,
) -> u64 {
    match last_block_time {
        Some(timestamp) if timestamp > 0 => timestamp,
        _ => {
            error!(
                "❌ No timestamp for block {} (asset {}, range {}), using wall-clock {}",
                range.end(),
                asset,
                range,
                started_at
            );
            started_at
        }
    }
}
