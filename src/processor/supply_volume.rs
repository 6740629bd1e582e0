//! Volume processor: event volume for the selected asset

use alloy_primitives::Address;
use std::sync::Arc;
use tracing::info;

use super::{select_asset, SnapshotProcessor};
use crate::config::Config;
use crate::contracts::known_symbol;
use crate::error::Result;
use crate::models::{EpochDescriptor, VolumeSnapshot};
use crate::sampler::{ChainReader, VolumeAggregator};

pub struct VolumeProcessor<R> {
    reader: Arc<R>,
    config: Arc<Config>,
}

impl<R: ChainReader> VolumeProcessor<R> {
    pub fn new(reader: Arc<R>, config: Arc<Config>) -> Self {
        Self { reader, config }
    }
}

impl<R: ChainReader> SnapshotProcessor for VolumeProcessor<R> {
    type Snapshot = VolumeSnapshot;

    async fn compute(&self, epoch: &EpochDescriptor) -> Result<Vec<(Address, VolumeSnapshot)>> {
        let range = epoch.range()?;
        let asset = select_asset(&self.config, epoch)?;
        info!(
            "🔍 Epoch {} [{}]: volume of {} ({})",
            epoch.epoch_id,
            range,
            known_symbol(&asset).unwrap_or("?"),
            asset
        );

        let aggregator = VolumeAggregator::new(
            self.reader.clone(),
            self.config.pool_address,
            self.config.oracle_address,
        );
        let snapshot = aggregator.sample_volume(asset, range).await?;
        Ok(vec![(asset, snapshot)])
    }
}
