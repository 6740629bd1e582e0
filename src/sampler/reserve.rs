//! Per-block reserve state over a block range
//!
//! Every metric is one batched multi-block read; all of them run
//! concurrently and the first failure aborts the sample. Per-block values
//! are then assembled into `PerBlockReserveState` records and transposed
//! into the field-oriented `TotalSupplySnapshot`.

use alloy_primitives::{Address, U256};
use futures::future::try_join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::chain::{call_on_range, call_once, ChainReader};
use super::numeric::{
    compounded_interest, normalized_debt, price_to_decimal, ratio, ray_mul, ray_to_decimal,
    usd_value,
};
use super::{chain_time_or_wall_clock, wall_clock_now};
use crate::contracts::{
    known_symbol, IAaveOracle, IPool, IReserveInterestRateStrategy, IScaledBalanceToken,
    IStableDebtToken, IERC20,
};
use crate::error::{Result, SnapshotError};
use crate::models::{
    AssetDetails, DebtData, EpochRange, PerBlockReserveState, RateDetails, SnapshotHeader,
    SupplyData, TotalSupplySnapshot,
};

// ============================================
// CONFIGURATION BITMAP
// ============================================

fn bits(data: U256, offset: usize, width: usize) -> u64 {
    let mask = (U256::from(1u64) << width) - U256::from(1u64);
    ((data >> offset) & mask).saturating_to::<u64>()
}

fn flag(data: U256, offset: usize) -> bool {
    bits(data, offset, 1) == 1
}

/// Decode the pool's packed `ReserveConfigurationMap`.
pub fn decode_configuration(data: U256) -> AssetDetails {
    AssetDetails {
        ltv: bits(data, 0, 16) as u16,
        liq_threshold: bits(data, 16, 16) as u16,
        liq_bonus: bits(data, 32, 16) as u16,
        decimals: bits(data, 48, 8) as u8,
        is_active: flag(data, 56),
        is_frozen: flag(data, 57),
        borrowing_enabled: flag(data, 58),
        stable_borrowing_enabled: flag(data, 59),
        is_paused: flag(data, 60),
        borrowable_in_isolation: flag(data, 61),
        siloed_borrowing: flag(data, 62),
        flash_loan_enabled: flag(data, 63),
        res_factor: bits(data, 64, 16) as u16,
        borrow_cap: bits(data, 80, 36),
        supply_cap: bits(data, 116, 36),
        liq_protocol_fee: bits(data, 152, 16) as u16,
        e_mode_category: bits(data, 168, 8) as u8,
        unbacked_mint_cap: bits(data, 176, 36),
        debt_ceiling: bits(data, 212, 40),
    }
}

// ============================================
// RAW INPUTS
// ============================================

/// Token contracts of a reserve, as resolved at the end of the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReserveTokens {
    a_token: Address,
    stable_debt: Address,
    variable_debt: Address,
}

impl ReserveTokens {
    fn from_reserve(reserve: &IPool::ReserveData) -> Self {
        Self {
            a_token: reserve.aTokenAddress,
            stable_debt: reserve.stableDebtTokenAddress,
            variable_debt: reserve.variableDebtTokenAddress,
        }
    }

    /// First field that differs from `other`.
    fn diff(&self, other: &Self) -> Option<&'static str> {
        if self.a_token != other.a_token {
            Some("aToken")
        } else if self.stable_debt != other.stable_debt {
            Some("stable debt token")
        } else if self.variable_debt != other.variable_debt {
            Some("variable debt token")
        } else {
            None
        }
    }
}

/// Contiguous runs of blocks that share one interest rate strategy.
fn strategy_runs(
    reserves: &[IPool::ReserveData],
    range: EpochRange,
) -> Result<Vec<(Address, EpochRange)>> {
    let mut runs = Vec::new();
    let mut start = range.begin();
    for (i, block) in range.blocks().enumerate().skip(1) {
        let previous = reserves[i - 1].interestRateStrategyAddress;
        if reserves[i].interestRateStrategyAddress != previous {
            runs.push((previous, EpochRange::new(start, block - 1)?));
            start = block;
        }
    }
    if let Some(last) = reserves.last() {
        runs.push((last.interestRateStrategyAddress, EpochRange::new(start, range.end())?));
    }
    Ok(runs)
}

#[derive(Debug, Clone, Copy)]
struct StrategyParams {
    variable_slope1: U256,
    variable_slope2: U256,
    stable_slope1: U256,
    stable_slope2: U256,
    base_variable_rate: U256,
    optimal_usage: U256,
}

/// Everything read for one block, before descaling.
struct RawBlock<'a> {
    block: u64,
    timestamp: Option<u64>,
    /// Time debt is accrued to
    now: u64,
    reserve: &'a IPool::ReserveData,
    a_token_supply: U256,
    scaled_variable_debt: U256,
    stable: &'a IStableDebtToken::getSupplyDataReturn,
    available_liquidity: U256,
    price: U256,
    strategy: StrategyParams,
}

fn assemble(raw: RawBlock<'_>) -> Result<PerBlockReserveState> {
    let reserve = raw.reserve;
    let asset_details = decode_configuration(reserve.configuration.data);
    let decimals = asset_details.decimals;
    let price = price_to_decimal(raw.price)?;
    let last_update = reserve.lastUpdateTimestamp.to::<u64>();

    let variable_index = normalized_debt(
        U256::from(reserve.variableBorrowIndex),
        U256::from(reserve.currentVariableBorrowRate),
        last_update,
        raw.now,
    )?;
    let variable_debt = ray_mul(raw.scaled_variable_debt, variable_index)?;

    let stable_growth = compounded_interest(
        raw.stable.avgStableRate,
        raw.stable.lastUpdateTimestamp.to::<u64>(),
        raw.now,
    )?;
    let stable_debt = ray_mul(raw.stable.principalSupply, stable_growth)?;

    let total_debt = variable_debt + stable_debt;
    let strategy = raw.strategy;
    let rate_details = RateDetails {
        var_rate_slope1: ray_to_decimal(strategy.variable_slope1)?,
        var_rate_slope2: ray_to_decimal(strategy.variable_slope2)?,
        stable_rate_slope1: ray_to_decimal(strategy.stable_slope1)?,
        stable_rate_slope2: ray_to_decimal(strategy.stable_slope2)?,
        base_var_rate: ray_to_decimal(strategy.base_variable_rate)?,
        optimal_rate: ray_to_decimal(strategy.optimal_usage)?,
        util_rate: ratio(total_debt, raw.available_liquidity + total_debt)?,
    };

    Ok(PerBlockReserveState {
        block: raw.block,
        timestamp: raw.timestamp,
        total_supply: SupplyData {
            token_supply: raw.a_token_supply,
            usd_supply: usd_value(raw.a_token_supply, decimals, price)?,
        },
        liquidity_rate: ray_to_decimal(U256::from(reserve.currentLiquidityRate))?,
        liquidity_index: ray_to_decimal(U256::from(reserve.liquidityIndex))?,
        total_stable_debt: DebtData {
            token_debt: stable_debt,
            usd_debt: usd_value(stable_debt, decimals, price)?,
        },
        total_variable_debt: DebtData {
            token_debt: variable_debt,
            usd_debt: usd_value(variable_debt, decimals, price)?,
        },
        variable_borrow_rate: ray_to_decimal(U256::from(reserve.currentVariableBorrowRate))?,
        stable_borrow_rate: ray_to_decimal(U256::from(reserve.currentStableBorrowRate))?,
        variable_borrow_index: ray_to_decimal(U256::from(reserve.variableBorrowIndex))?,
        last_update_timestamp: last_update,
        isolation_mode_total_debt: reserve.isolationModeTotalDebt,
        asset_details,
        available_liquidity: SupplyData {
            token_supply: raw.available_liquidity,
            usd_supply: usd_value(raw.available_liquidity, decimals, price)?,
        },
        rate_details,
    })
}

// ============================================
// SAMPLER
// ============================================

pub struct ReserveSampler<R> {
    reader: Arc<R>,
    pool: Address,
    oracle: Address,
}

impl<R: ChainReader> ReserveSampler<R> {
    pub fn new(reader: Arc<R>, pool: Address, oracle: Address) -> Self {
        Self { reader, pool, oracle }
    }

    /// Reserve state of `asset` at every block of `range`.
    pub async fn sample_reserve_state(
        &self,
        asset: Address,
        range: EpochRange,
    ) -> Result<TotalSupplySnapshot> {
        let started = Instant::now();
        let started_at = wall_clock_now();
        let reader = &*self.reader;

        let reserve_call = IPool::getReserveDataCall { asset };
        let resolved =
            call_once(reader, self.pool, &reserve_call, Some(range.end()), "reserve data").await?;
        let tokens = ReserveTokens::from_reserve(&resolved);
        debug!(
            "Reserve {} ({}): aToken={} variableDebt={} stableDebt={}",
            asset,
            known_symbol(&asset).unwrap_or("?"),
            tokens.a_token,
            tokens.variable_debt,
            tokens.stable_debt
        );

        let supply_call = IERC20::totalSupplyCall {};
        let scaled_call = IScaledBalanceToken::scaledTotalSupplyCall {};
        let stable_call = IStableDebtToken::getSupplyDataCall {};
        let liquidity_call = IERC20::balanceOfCall { account: tokens.a_token };
        let price_call = IAaveOracle::getAssetPriceCall { asset };

        // Strategy parameters are read from each block's own strategy
        let reserves_and_strategy = async {
            let reserves =
                call_on_range(reader, self.pool, &reserve_call, range, "reserve data").await?;
            let strategy = self.fetch_rate_strategies(&reserves, range).await?;
            Ok::<_, SnapshotError>((reserves, strategy))
        };

        let ((reserves, strategy), a_supply, scaled_variable, stable, liquidity, prices, timestamps) =
            futures::try_join!(
                reserves_and_strategy,
                call_on_range(reader, tokens.a_token, &supply_call, range, "aToken supply"),
                call_on_range(reader, tokens.variable_debt, &scaled_call, range, "variable debt"),
                call_on_range(reader, tokens.stable_debt, &stable_call, range, "stable debt"),
                call_on_range(reader, asset, &liquidity_call, range, "available liquidity"),
                call_on_range(reader, self.oracle, &price_call, range, "asset price"),
                reader.block_timestamps(range),
            )?;

        if timestamps.len() != range.len() {
            return Err(SnapshotError::DataUnavailable {
                metric: "block timestamps",
                block: range.end(),
            });
        }
        let timestamps: Vec<Option<u64>> =
            timestamps.into_iter().map(|ts| ts.filter(|ts| *ts > 0)).collect();

        // Only the last block may fall back to the wall clock
        if let Some(block) = range
            .blocks()
            .zip(&timestamps)
            .find(|(block, ts)| ts.is_none() && *block != range.end())
            .map(|(block, _)| block)
        {
            return Err(SnapshotError::DataUnavailable {
                metric: "block timestamps",
                block,
            });
        }

        let effective_end = chain_time_or_wall_clock(
            asset,
            range,
            timestamps.last().copied().flatten(),
            started_at,
        );

        let mut blocks = Vec::with_capacity(range.len());
        for (i, block) in range.blocks().enumerate() {
            let reserve = &reserves[i];
            if let Some(field) = ReserveTokens::from_reserve(reserve).diff(&tokens) {
                return Err(SnapshotError::ReserveChanged { asset, field, block });
            }

            blocks.push(assemble(RawBlock {
                block,
                timestamp: timestamps[i],
                now: timestamps[i].unwrap_or(effective_end),
                reserve,
                a_token_supply: a_supply[i],
                scaled_variable_debt: scaled_variable[i],
                stable: &stable[i],
                available_liquidity: liquidity[i],
                price: prices[i],
                strategy: strategy[i],
            })?);
        }

        let header = SnapshotHeader {
            contract: asset,
            chain_height_range: range,
            timestamp: effective_end,
        };

        info!(
            "📊 Reserve state for {} over {} ({} blocks) in {:?}",
            asset,
            range,
            blocks.len(),
            started.elapsed()
        );
        Ok(TotalSupplySnapshot::from_blocks(header, &blocks))
    }

    /// Strategy parameters for every block, one read per strategy in effect.
    async fn fetch_rate_strategies(
        &self,
        reserves: &[IPool::ReserveData],
        range: EpochRange,
    ) -> Result<Vec<StrategyParams>> {
        let runs = strategy_runs(reserves, range)?;
        if runs.len() > 1 {
            info!(
                "Interest rate strategy changes {} times over {}",
                runs.len() - 1,
                range
            );
        }

        let per_run = try_join_all(
            runs.into_iter()
                .map(|(strategy, run)| self.fetch_rate_strategy(strategy, run)),
        )
        .await?;
        Ok(per_run.into_iter().flatten().collect())
    }

    async fn fetch_rate_strategy(
        &self,
        strategy: Address,
        range: EpochRange,
    ) -> Result<Vec<StrategyParams>> {
        use IReserveInterestRateStrategy as S;
        let reader = &*self.reader;

        let v1_call = S::getVariableRateSlope1Call {};
        let v2_call = S::getVariableRateSlope2Call {};
        let s1_call = S::getStableRateSlope1Call {};
        let s2_call = S::getStableRateSlope2Call {};
        let base_call = S::getBaseVariableBorrowRateCall {};
        let optimal_call = S::OPTIMAL_USAGE_RATIOCall {};

        let (v1, v2, s1, s2, base, optimal) = futures::try_join!(
            call_on_range(reader, strategy, &v1_call, range, "variable slope 1"),
            call_on_range(reader, strategy, &v2_call, range, "variable slope 2"),
            call_on_range(reader, strategy, &s1_call, range, "stable slope 1"),
            call_on_range(reader, strategy, &s2_call, range, "stable slope 2"),
            call_on_range(reader, strategy, &base_call, range, "base variable rate"),
            call_on_range(reader, strategy, &optimal_call, range, "optimal usage ratio"),
        )?;

        Ok((0..range.len())
            .map(|i| StrategyParams {
                variable_slope1: v1[i],
                variable_slope2: v2[i],
                stable_slope1: s1[i],
                stable_slope2: s2[i],
                base_variable_rate: base[i],
                optimal_usage: optimal[i],
            })
            .collect())
    }
}
