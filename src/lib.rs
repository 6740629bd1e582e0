//! Deterministic per-epoch Aave V3 snapshots
//!
//! Every snapshotter node computes, from the same finalized chain state, the
//! same reserve-state and trade-volume snapshot for the asset the pair
//! selector assigns it. The crate reads chain state only; submission and
//! storage live elsewhere.

pub mod config;
pub mod contracts;
pub mod error;
pub mod models;
pub mod processor;
pub mod sampler;

pub use config::Config;
pub use error::{Result, SnapshotError};
pub use models::{
    EpochDescriptor, EpochRange, PriceTable, SnapshotHeader, TotalSupplySnapshot, VolumeSnapshot,
};
pub use processor::{SnapshotProcessor, TotalSupplyProcessor, VolumeProcessor};
pub use sampler::{ChainReader, RpcChainReader};
