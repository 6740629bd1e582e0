//! Trade volume from pool event logs
//!
//! Five event categories are fetched concurrently for one reserve and summed.
//! Sums are per block priced, so volume over a range equals the sum of
//! volumes over any partition of it.

use alloy_primitives::{Address, B256, U256};
use alloy_rpc_types::Log;
use alloy_sol_types::SolEvent;
use futures::future::try_join_all;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::chain::{call_once, ChainReader, LogQuery};
use super::numeric::usd_value;
use super::prices::PriceSampler;
use super::{chain_time_or_wall_clock, wall_clock_now};
use crate::contracts::{IPool, IERC20};
use crate::error::{Result, SnapshotError};
use crate::models::{
    BlockKey, BlockMap, EpochRange, LiquidationRecord, PriceTable, VolumeData, VolumeSnapshot,
};

// ============================================
// EVENT CATEGORIES
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    Borrow,
    Repay,
    Supply,
    Withdraw,
    Liquidation,
}

impl EventCategory {
    /// Order in which categories are reported and flattened.
    pub const ALL: [EventCategory; 5] = [
        EventCategory::Borrow,
        EventCategory::Repay,
        EventCategory::Supply,
        EventCategory::Withdraw,
        EventCategory::Liquidation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EventCategory::Borrow => "borrow",
            EventCategory::Repay => "repay",
            EventCategory::Supply => "supply",
            EventCategory::Withdraw => "withdraw",
            EventCategory::Liquidation => "liquidation",
        }
    }

    /// topic0 of the category's pool event
    pub fn signature(self) -> B256 {
        match self {
            EventCategory::Borrow => IPool::Borrow::SIGNATURE_HASH,
            EventCategory::Repay => IPool::Repay::SIGNATURE_HASH,
            EventCategory::Supply => IPool::Supply::SIGNATURE_HASH,
            EventCategory::Withdraw => IPool::Withdraw::SIGNATURE_HASH,
            EventCategory::Liquidation => IPool::LiquidationCall::SIGNATURE_HASH,
        }
    }

    /// Amount the category sums, in the monitored reserve's raw units.
    /// Liquidations count the collateral seized.
    pub fn amount(self, log: &Log) -> Result<U256> {
        let amount = match self {
            EventCategory::Borrow => log.log_decode::<IPool::Borrow>().map(|l| l.inner.data.amount),
            EventCategory::Repay => log.log_decode::<IPool::Repay>().map(|l| l.inner.data.amount),
            EventCategory::Supply => log.log_decode::<IPool::Supply>().map(|l| l.inner.data.amount),
            EventCategory::Withdraw => {
                log.log_decode::<IPool::Withdraw>().map(|l| l.inner.data.amount)
            }
            EventCategory::Liquidation => log
                .log_decode::<IPool::LiquidationCall>()
                .map(|l| l.inner.data.liquidatedCollateralAmount),
        };
        amount.map_err(|e| SnapshotError::Decode {
            metric: self.name(),
            block: log.block_number.unwrap_or_default(),
            reason: e.to_string(),
        })
    }
}

fn log_block(log: &Log, metric: &'static str, range: EpochRange) -> Result<u64> {
    log.block_number
        .filter(|block| range.contains(*block))
        .ok_or(SnapshotError::DataUnavailable { metric, block: range.end() })
}

/// Sum `category` over `logs`, each amount priced at its own block.
fn total(
    category: EventCategory,
    logs: &[Log],
    range: EpochRange,
    decimals: u8,
    prices: &BlockMap<Decimal>,
) -> Result<VolumeData> {
    let mut data = VolumeData::default();
    for log in logs {
        let amount = category.amount(log)?;
        let block = log_block(log, category.name(), range)?;
        let price = prices
            .get(&BlockKey(block))
            .ok_or(SnapshotError::DataUnavailable { metric: "asset price", block })?;

        data.totals = data
            .totals
            .checked_add(amount)
            .ok_or(SnapshotError::NumericOverflow("summing event amounts"))?;
        data.total_usd = data
            .total_usd
            .checked_add(usd_value(amount, decimals, *price)?)
            .ok_or(SnapshotError::NumericOverflow("summing event USD values"))?;
    }
    Ok(data)
}

// ============================================
// AGGREGATOR
// ============================================

pub struct VolumeAggregator<R> {
    reader: Arc<R>,
    pool: Address,
    oracle: Address,
}

impl<R: ChainReader> VolumeAggregator<R> {
    pub fn new(reader: Arc<R>, pool: Address, oracle: Address) -> Self {
        Self { reader, pool, oracle }
    }

    /// Borrow, repay, supply, withdraw and liquidation volume of `asset`
    /// over `range`.
    pub async fn sample_volume(&self, asset: Address, range: EpochRange) -> Result<VolumeSnapshot> {
        let started = Instant::now();
        let started_at = wall_clock_now();
        let reader = &*self.reader;
        let prices = PriceSampler::new(self.reader.clone(), self.pool, self.oracle);
        let topic = asset.into_word();
        let last_block = EpochRange::new(range.end(), range.end())?;
        let decimals_call = IERC20::decimalsCall {};

        let (borrow, repay, supply, withdraw, liquidation, end_time, asset_prices, decimals) =
            futures::try_join!(
                self.fetch_logs(EventCategory::Borrow, topic, range),
                self.fetch_logs(EventCategory::Repay, topic, range),
                self.fetch_logs(EventCategory::Supply, topic, range),
                self.fetch_logs(EventCategory::Withdraw, topic, range),
                self.fetch_logs(EventCategory::Liquidation, topic, range),
                reader.block_timestamps(last_block),
                prices.sample_asset_prices(asset, range),
                call_once(reader, asset, &decimals_call, Some(range.end()), "decimals"),
            )?;

        let liquidation_list = if liquidation.is_empty() {
            Vec::new()
        } else {
            let table = prices.sample_prices(range).await?;
            self.liquidation_records(&liquidation, range, decimals, &asset_prices, &table)
                .await?
        };

        let mut snapshot = VolumeSnapshot {
            contract: asset,
            chain_height_range: range,
            timestamp: chain_time_or_wall_clock(
                asset,
                range,
                end_time.last().copied().flatten(),
                started_at,
            ),
            borrow: total(EventCategory::Borrow, &borrow, range, decimals, &asset_prices)?,
            repay: total(EventCategory::Repay, &repay, range, decimals, &asset_prices)?,
            supply: total(EventCategory::Supply, &supply, range, decimals, &asset_prices)?,
            withdraw: total(EventCategory::Withdraw, &withdraw, range, decimals, &asset_prices)?,
            liquidation: total(
                EventCategory::Liquidation,
                &liquidation,
                range,
                decimals,
                &asset_prices,
            )?,
            events: Vec::new(),
            liquidation_list,
        };
        snapshot.events = [borrow, repay, supply, withdraw, liquidation].concat();

        info!(
            "📈 Volume for {} over {}: {} events, {} liquidations in {:?}",
            asset,
            range,
            snapshot.events.len(),
            snapshot.liquidation_list.len(),
            started.elapsed()
        );
        Ok(snapshot)
    }

    /// Logs of one category, ordered by (block, log index).
    async fn fetch_logs(
        &self,
        category: EventCategory,
        reserve_topic: B256,
        range: EpochRange,
    ) -> Result<Vec<Log>> {
        let query = LogQuery {
            address: self.pool,
            event_signature: category.signature(),
            reserve_topic,
            range,
        };
        let mut logs = self.reader.get_logs(&query).await?;
        logs.sort_by_key(|log| (log.block_number, log.log_index));

        debug!("{} {} logs over {}", logs.len(), category.name(), range);
        Ok(logs)
    }

    async fn liquidation_records(
        &self,
        logs: &[Log],
        range: EpochRange,
        collateral_decimals: u8,
        collateral_prices: &BlockMap<Decimal>,
        table: &PriceTable,
    ) -> Result<Vec<LiquidationRecord>> {
        let metric = EventCategory::Liquidation.name();
        let events = logs
            .iter()
            .map(|log| {
                let decoded = log.log_decode::<IPool::LiquidationCall>().map_err(|e| {
                    SnapshotError::Decode {
                        metric,
                        block: log.block_number.unwrap_or_default(),
                        reason: e.to_string(),
                    }
                })?;
                Ok((log, decoded.inner.data))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut debt_assets: Vec<Address> = events.iter().map(|(_, e)| e.debtAsset).collect();
        debt_assets.sort();
        debt_assets.dedup();
        let debt_decimals: BTreeMap<Address, u8> = try_join_all(debt_assets.iter().map(|debt| {
            let reader = &*self.reader;
            async move {
                let decimals =
                    call_once(reader, *debt, &IERC20::decimalsCall {}, Some(range.end()), "decimals")
                        .await?;
                Ok::<_, SnapshotError>((*debt, decimals))
            }
        }))
        .await?
        .into_iter()
        .collect();

        events
            .into_iter()
            .map(|(log, event)| {
                let block = log_block(log, metric, range)?;
                let debt_price = table
                    .price(block, &event.debtAsset)
                    .ok_or(SnapshotError::DataUnavailable { metric: "debt asset price", block })?;
                let collateral_price = collateral_prices
                    .get(&BlockKey(block))
                    .ok_or(SnapshotError::DataUnavailable { metric: "asset price", block })?;
                let debt_decimals = debt_decimals
                    .get(&event.debtAsset)
                    .copied()
                    .ok_or(SnapshotError::DataUnavailable { metric: "decimals", block })?;

                Ok(LiquidationRecord {
                    collateral_asset: event.collateralAsset,
                    debt_asset: event.debtAsset,
                    user: event.user,
                    liquidator: event.liquidator,
                    debt_to_cover: event.debtToCover,
                    liquidated_collateral_amount: event.liquidatedCollateralAmount,
                    debt_to_cover_usd: usd_value(event.debtToCover, debt_decimals, debt_price)?,
                    liquidated_collateral_usd: usd_value(
                        event.liquidatedCollateralAmount,
                        collateral_decimals,
                        *collateral_price,
                    )?,
                    receive_a_token: event.receiveAToken,
                    block_number: block,
                    transaction_hash: log.transaction_hash,
                })
            })
            .collect()
    }
}
