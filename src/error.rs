//! Error kinds for snapshot computation
//!
//! Every hard error aborts the whole computation: a snapshot is either
//! complete for every block in its range or not produced at all.

use alloy_primitives::Address;

pub type Result<T, E = SnapshotError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Bad static configuration (empty asset list, malformed identity, ...).
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("invalid block range: begin {begin} is after end {end}")]
    InvalidRange { begin: u64, end: u64 },

    /// A block is missing from a batched response.
    #[error("no {metric} data for block {block}")]
    DataUnavailable { metric: &'static str, block: u64 },

    #[error("failed to decode {metric} at block {block}: {reason}")]
    Decode { metric: &'static str, block: u64, reason: String },

    #[error("reserve {asset} changed {field} within the sampled range at block {block}")]
    ReserveChanged { asset: Address, field: &'static str, block: u64 },

    #[error("numeric overflow while {0}")]
    NumericOverflow(&'static str),

    /// Underlying RPC failure, passed through unchanged.
    #[error(transparent)]
    Transport(#[from] alloy_transport::TransportError),
}

impl SnapshotError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// True for errors caused by the chain data rather than by configuration.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::DataUnavailable { .. } | Self::Decode { .. } | Self::ReserveChanged { .. }
        )
    }
}
