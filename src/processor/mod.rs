//! Epoch processors: select an asset, sample it, return the snapshot

pub mod selector;
pub mod supply_volume;
pub mod total_supply;

pub use selector::select;
pub use supply_volume::VolumeProcessor;
pub use total_supply::TotalSupplyProcessor;

use alloy_primitives::Address;

use crate::config::Config;
use crate::error::{Result, SnapshotError};
use crate::models::EpochDescriptor;

/// One snapshot kind computed for one epoch.
///
/// Implementations read chain state only; the same epoch always yields the
/// same snapshot. Errors are returned as-is, retries belong to the caller.
#[allow(async_fn_in_trait)]
pub trait SnapshotProcessor {
    type Snapshot;

    /// `(asset, snapshot)` pairs for the assets this node is assigned.
    async fn compute(&self, epoch: &EpochDescriptor) -> Result<Vec<(Address, Self::Snapshot)>>;
}

/// The monitored asset this node snapshots for `epoch`.
pub fn select_asset(config: &Config, epoch: &EpochDescriptor) -> Result<Address> {
    let index = select(
        epoch.epoch_id,
        epoch.day,
        &config.instance_id,
        config.slot_id,
        config.monitored_assets.len(),
    )?;
    config
        .monitored_assets
        .get(index)
        .copied()
        .ok_or_else(|| SnapshotError::configuration(format!("no monitored asset at index {index}")))
}
