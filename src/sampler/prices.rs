//! Oracle price sampling over a block range

use alloy_primitives::Address;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::chain::{call_on_range, call_once, ChainReader};
use super::numeric::price_to_decimal;
use crate::contracts::{IAaveOracle, IPool};
use crate::error::{Result, SnapshotError};
use crate::models::{BlockKey, BlockMap, EpochRange, PriceTable};

pub struct PriceSampler<R> {
    reader: Arc<R>,
    pool: Address,
    oracle: Address,
}

impl<R: ChainReader> PriceSampler<R> {
    pub fn new(reader: Arc<R>, pool: Address, oracle: Address) -> Self {
        Self { reader, pool, oracle }
    }

    /// USD price of every reserve asset at every block of `range`.
    ///
    /// The reserve list is read once, at `range.end`, and priced with one
    /// batched bulk-oracle read.
    pub async fn sample_prices(&self, range: EpochRange) -> Result<PriceTable> {
        let started = Instant::now();

        let reserves = call_once(
            &*self.reader,
            self.pool,
            &IPool::getReservesListCall {},
            Some(range.end()),
            "reserves list",
        )
        .await?;
        if reserves.is_empty() {
            return Err(SnapshotError::DataUnavailable {
                metric: "reserves list",
                block: range.end(),
            });
        }
        debug!("Pricing {} reserves over {}", reserves.len(), range);

        let call = IAaveOracle::getAssetsPricesCall { assets: reserves.clone() };
        let rows = call_on_range(&*self.reader, self.oracle, &call, range, "asset prices").await?;

        let mut table = PriceTable::default();
        for (block, prices) in range.blocks().zip(rows) {
            if prices.len() != reserves.len() {
                return Err(SnapshotError::DataUnavailable { metric: "asset prices", block });
            }
            for (asset, raw) in reserves.iter().zip(prices) {
                if raw.is_zero() {
                    warn!("Oracle returned zero price for {} at block {}", asset, block);
                }
                table.insert(block, *asset, price_to_decimal(raw)?);
            }
        }

        info!(
            "💲 Price table: {} blocks x {} assets in {:?}",
            table.len(),
            reserves.len(),
            started.elapsed()
        );
        Ok(table)
    }

    /// USD price of one asset at every block of `range`.
    pub async fn sample_asset_prices(
        &self,
        asset: Address,
        range: EpochRange,
    ) -> Result<BlockMap<Decimal>> {
        let call = IAaveOracle::getAssetPriceCall { asset };
        let raw = call_on_range(&*self.reader, self.oracle, &call, range, "asset price").await?;

        range
            .blocks()
            .zip(raw)
            .map(|(block, price)| Ok((BlockKey(block), price_to_decimal(price)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{AAVE_V3_ORACLE, AAVE_V3_POOL, DEFAULT_MONITORED_ASSETS};
    use crate::sampler::mock::MockChain;
    use alloy_primitives::U256;

    fn reserves() -> Vec<Address> {
        DEFAULT_MONITORED_ASSETS.iter().take(3).map(|(addr, _)| *addr).collect()
    }

    /// Price of reserve `i` at `block`, 8 decimals
    fn raw_price(i: usize, block: u64) -> U256 {
        U256::from((i as u64 + 1) * 100_000_000 + block)
    }

    fn priced_chain() -> MockChain {
        MockChain::new()
            .on_call::<IPool::getReservesListCall>(AAVE_V3_POOL, |_, _| Some(reserves()))
            .on_call::<IAaveOracle::getAssetsPricesCall>(AAVE_V3_ORACLE, |block, call| {
                Some((0..call.assets.len()).map(|i| raw_price(i, block)).collect())
            })
            .on_call::<IAaveOracle::getAssetPriceCall>(AAVE_V3_ORACLE, |block, call| {
                let i = reserves().iter().position(|a| *a == call.asset)?;
                Some(raw_price(i, block))
            })
    }

    #[tokio::test]
    async fn test_price_table_covers_every_block_and_asset() {
        let sampler = PriceSampler::new(Arc::new(priced_chain()), AAVE_V3_POOL, AAVE_V3_ORACLE);
        let range = EpochRange::new(50, 59).unwrap();

        let table = sampler.sample_prices(range).await.unwrap();

        assert_eq!(table.len(), range.len());
        for (block, row) in table.iter() {
            assert!(range.contains(block));
            assert_eq!(row.len(), reserves().len());
            assert!(row.values().all(|price| *price > Decimal::ZERO));
        }
        // 2 * 10^8 + 55 at 8 decimals
        assert_eq!(
            table.price(55, &reserves()[1]),
            Some(Decimal::new(200_000_055, 8))
        );
    }

    #[tokio::test]
    async fn test_short_price_row_is_data_unavailable() {
        let chain = priced_chain().on_call::<IAaveOracle::getAssetsPricesCall>(
            AAVE_V3_ORACLE,
            |block, call| {
                let count = if block == 52 { call.assets.len() - 1 } else { call.assets.len() };
                Some((0..count).map(|i| raw_price(i, block)).collect())
            },
        );
        let sampler = PriceSampler::new(Arc::new(chain), AAVE_V3_POOL, AAVE_V3_ORACLE);

        let err = sampler.sample_prices(EpochRange::new(50, 54).unwrap()).await.unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::DataUnavailable { metric: "asset prices", block: 52 }
        ));
    }

    #[tokio::test]
    async fn test_single_asset_series() {
        let sampler = PriceSampler::new(Arc::new(priced_chain()), AAVE_V3_POOL, AAVE_V3_ORACLE);
        let range = EpochRange::new(7, 9).unwrap();

        let series = sampler.sample_asset_prices(reserves()[0], range).await.unwrap();

        assert_eq!(series.len(), 3);
        assert_eq!(series[&BlockKey(9)], Decimal::new(100_000_009, 8));
    }
}
