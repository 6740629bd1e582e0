//! Snapshot wire types
//!
//! The field layout of `TotalSupplySnapshot` and `VolumeSnapshot` is what the
//! submission layer compares across nodes. Renaming or reshaping a field is a
//! breaking change.

use alloy_primitives::{Address, B256, U256};
use alloy_rpc_types::Log;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

use crate::error::{Result, SnapshotError};

// ============================================
// BLOCK RANGES
// ============================================

/// Inclusive range of finalized block heights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RangeBounds")]
pub struct EpochRange {
    begin: u64,
    end: u64,
}

#[derive(Deserialize)]
struct RangeBounds {
    begin: u64,
    end: u64,
}

impl TryFrom<RangeBounds> for EpochRange {
    type Error = SnapshotError;

    fn try_from(bounds: RangeBounds) -> Result<Self> {
        Self::new(bounds.begin, bounds.end)
    }
}

impl EpochRange {
    pub fn new(begin: u64, end: u64) -> Result<Self> {
        if begin > end {
            return Err(SnapshotError::InvalidRange { begin, end });
        }
        Ok(Self { begin, end })
    }

    pub fn begin(&self) -> u64 {
        self.begin
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of blocks in the range (never zero).
    pub fn len(&self) -> usize {
        (self.end - self.begin + 1) as usize
    }

    pub fn blocks(&self) -> RangeInclusive<u64> {
        self.begin..=self.end
    }

    pub fn contains(&self, block: u64) -> bool {
        self.blocks().contains(&block)
    }

    /// Split into `[begin, mid]` and `[mid + 1, end]`.
    pub fn split_at(&self, mid: u64) -> Option<(EpochRange, EpochRange)> {
        if mid < self.begin || mid >= self.end {
            return None;
        }
        Some((
            EpochRange { begin: self.begin, end: mid },
            EpochRange { begin: mid + 1, end: self.end },
        ))
    }
}

impl fmt::Display for EpochRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.begin, self.end)
    }
}

/// Unit of work handed out by the epoch scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochDescriptor {
    pub begin: u64,
    pub end: u64,
    pub epoch_id: u64,
    pub day: u64,
}

impl EpochDescriptor {
    pub fn range(&self) -> Result<EpochRange> {
        EpochRange::new(self.begin, self.end)
    }
}

// ============================================
// BLOCK-KEYED MAPS
// ============================================

/// Map key rendered as `block<N>` on the wire, ordered by block number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockKey(pub u64);

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block{}", self.0)
    }
}

impl Serialize for BlockKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BlockKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.strip_prefix("block")
            .and_then(|n| n.parse().ok())
            .map(BlockKey)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid block key: {raw}")))
    }
}

pub type BlockMap<T> = BTreeMap<BlockKey, T>;

// ============================================
// RESERVE STATE VALUES
// ============================================

/// aToken supply or idle liquidity, raw token units plus USD value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyData {
    pub token_supply: U256,
    pub usd_supply: Decimal,
}

/// Debt-token supply, raw token units plus USD value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtData {
    pub token_debt: U256,
    pub usd_debt: Decimal,
}

/// Reserve configuration decoded from the pool's configuration bitmap.
/// Percentages are basis points; caps are whole tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDetails {
    pub ltv: u16,
    pub liq_threshold: u16,
    pub liq_bonus: u16,
    pub decimals: u8,
    pub is_active: bool,
    pub is_frozen: bool,
    pub borrowing_enabled: bool,
    pub stable_borrowing_enabled: bool,
    pub is_paused: bool,
    pub borrowable_in_isolation: bool,
    pub siloed_borrowing: bool,
    pub flash_loan_enabled: bool,
    pub res_factor: u16,
    pub borrow_cap: u64,
    pub supply_cap: u64,
    pub liq_protocol_fee: u16,
    pub e_mode_category: u8,
    pub unbacked_mint_cap: u64,
    pub debt_ceiling: u64,
}

/// Interest-rate strategy parameters and current utilization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateDetails {
    pub var_rate_slope1: Decimal,
    pub var_rate_slope2: Decimal,
    pub stable_rate_slope1: Decimal,
    pub stable_rate_slope2: Decimal,
    pub base_var_rate: Decimal,
    pub optimal_rate: Decimal,
    pub util_rate: Decimal,
}

/// Reserve state at one block. Built by the reserve sampler, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerBlockReserveState {
    pub block: u64,
    /// Chain timestamp of the block, `None` when the node did not return it.
    pub timestamp: Option<u64>,
    pub total_supply: SupplyData,
    pub liquidity_rate: Decimal,
    pub liquidity_index: Decimal,
    pub total_stable_debt: DebtData,
    pub total_variable_debt: DebtData,
    pub variable_borrow_rate: Decimal,
    pub stable_borrow_rate: Decimal,
    pub variable_borrow_index: Decimal,
    pub last_update_timestamp: u64,
    pub isolation_mode_total_debt: u128,
    pub asset_details: AssetDetails,
    pub available_liquidity: SupplyData,
    pub rate_details: RateDetails,
}

// ============================================
// SNAPSHOTS
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotHeader {
    pub contract: Address,
    pub chain_height_range: EpochRange,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalSupplySnapshot {
    pub contract: Address,
    pub chain_height_range: EpochRange,
    pub timestamp: u64,
    pub total_a_token: BlockMap<SupplyData>,
    pub liquidity_rate: BlockMap<Decimal>,
    pub liquidity_index: BlockMap<Decimal>,
    pub total_variable_debt: BlockMap<DebtData>,
    pub total_stable_debt: BlockMap<DebtData>,
    pub variable_borrow_rate: BlockMap<Decimal>,
    pub stable_borrow_rate: BlockMap<Decimal>,
    pub variable_borrow_index: BlockMap<Decimal>,
    pub last_update_timestamp: BlockMap<u64>,
    pub isolation_mode_total_debt: BlockMap<u128>,
    pub asset_details: BlockMap<AssetDetails>,
    pub rate_details: BlockMap<RateDetails>,
    pub available_liquidity: BlockMap<SupplyData>,
}

impl TotalSupplySnapshot {
    /// Transpose per-block records into one map per field.
    pub fn from_blocks(header: SnapshotHeader, blocks: &[PerBlockReserveState]) -> Self {
        let mut snapshot = Self {
            contract: header.contract,
            chain_height_range: header.chain_height_range,
            timestamp: header.timestamp,
            total_a_token: BlockMap::new(),
            liquidity_rate: BlockMap::new(),
            liquidity_index: BlockMap::new(),
            total_variable_debt: BlockMap::new(),
            total_stable_debt: BlockMap::new(),
            variable_borrow_rate: BlockMap::new(),
            stable_borrow_rate: BlockMap::new(),
            variable_borrow_index: BlockMap::new(),
            last_update_timestamp: BlockMap::new(),
            isolation_mode_total_debt: BlockMap::new(),
            asset_details: BlockMap::new(),
            rate_details: BlockMap::new(),
            available_liquidity: BlockMap::new(),
        };

        for state in blocks {
            let key = BlockKey(state.block);
            snapshot.total_a_token.insert(key, state.total_supply);
            snapshot.liquidity_rate.insert(key, state.liquidity_rate);
            snapshot.liquidity_index.insert(key, state.liquidity_index);
            snapshot.total_variable_debt.insert(key, state.total_variable_debt);
            snapshot.total_stable_debt.insert(key, state.total_stable_debt);
            snapshot.variable_borrow_rate.insert(key, state.variable_borrow_rate);
            snapshot.stable_borrow_rate.insert(key, state.stable_borrow_rate);
            snapshot.variable_borrow_index.insert(key, state.variable_borrow_index);
            snapshot.last_update_timestamp.insert(key, state.last_update_timestamp);
            snapshot.isolation_mode_total_debt.insert(key, state.isolation_mode_total_debt);
            snapshot.asset_details.insert(key, state.asset_details);
            snapshot.rate_details.insert(key, state.rate_details);
            snapshot.available_liquidity.insert(key, state.available_liquidity);
        }

        snapshot
    }

    pub fn header(&self) -> SnapshotHeader {
        SnapshotHeader {
            contract: self.contract,
            chain_height_range: self.chain_height_range,
            timestamp: self.timestamp,
        }
    }
}

/// Summed amount for one event category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VolumeData {
    /// Raw token units.
    pub totals: U256,
    #[serde(rename = "totalUSD")]
    pub total_usd: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidationRecord {
    pub collateral_asset: Address,
    pub debt_asset: Address,
    pub user: Address,
    pub liquidator: Address,
    pub debt_to_cover: U256,
    pub liquidated_collateral_amount: U256,
    #[serde(rename = "debtToCoverUSD")]
    pub debt_to_cover_usd: Decimal,
    #[serde(rename = "liquidatedCollateralUSD")]
    pub liquidated_collateral_usd: Decimal,
    pub receive_a_token: bool,
    pub block_number: u64,
    pub transaction_hash: Option<B256>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshot {
    pub contract: Address,
    pub chain_height_range: EpochRange,
    pub timestamp: u64,
    pub borrow: VolumeData,
    pub repay: VolumeData,
    pub supply: VolumeData,
    pub withdraw: VolumeData,
    pub liquidation: VolumeData,
    /// Raw logs of every category, flattened for auditing.
    pub events: Vec<Log>,
    pub liquidation_list: Vec<LiquidationRecord>,
}

impl VolumeSnapshot {
    pub fn header(&self) -> SnapshotHeader {
        SnapshotHeader {
            contract: self.contract,
            chain_height_range: self.chain_height_range,
            timestamp: self.timestamp,
        }
    }
}

// ============================================
// PRICE TABLE
// ============================================

/// Oracle prices (USD, descaled) per block per reserve asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceTable {
    prices: BlockMap<BTreeMap<Address, Decimal>>,
}

impl PriceTable {
    pub fn insert(&mut self, block: u64, asset: Address, price: Decimal) {
        self.prices.entry(BlockKey(block)).or_default().insert(asset, price);
    }

    pub fn price(&self, block: u64, asset: &Address) -> Option<Decimal> {
        self.prices.get(&BlockKey(block)).and_then(|row| row.get(asset)).copied()
    }

    pub fn block(&self, block: u64) -> Option<&BTreeMap<Address, Decimal>> {
        self.prices.get(&BlockKey(block))
    }

    /// Number of blocks covered.
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &BTreeMap<Address, Decimal>)> {
        self.prices.iter().map(|(key, row)| (key.0, row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn test_epoch_range_bounds() {
        let range = EpochRange::new(19422690, 19422699).unwrap();
        assert_eq!(range.len(), 10);
        assert!(range.contains(19422699));
        assert!(!range.contains(19422700));

        assert!(EpochRange::new(10, 9).is_err());
        assert_eq!(EpochRange::new(7, 7).unwrap().len(), 1);
    }

    #[test]
    fn test_epoch_range_split() {
        let range = EpochRange::new(100, 109).unwrap();
        let (left, right) = range.split_at(104).unwrap();
        assert_eq!((left.begin(), left.end()), (100, 104));
        assert_eq!((right.begin(), right.end()), (105, 109));
        assert_eq!(left.len() + right.len(), range.len());

        // Both halves must be non-empty
        assert!(range.split_at(109).is_none());
        assert!(range.split_at(99).is_none());
    }

    #[test]
    fn test_epoch_range_rejects_inverted_json() {
        let ok: EpochRange = serde_json::from_str(r#"{"begin":1,"end":2}"#).unwrap();
        assert_eq!(ok.len(), 2);
        assert!(serde_json::from_str::<EpochRange>(r#"{"begin":3,"end":2}"#).is_err());
    }

    #[test]
    fn test_block_key_wire_format() {
        let mut map: BlockMap<u64> = BlockMap::new();
        map.insert(BlockKey(1000), 2);
        map.insert(BlockKey(999), 1);

        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"block999":1,"block1000":2}"#);

        let back: BlockMap<u64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
        assert!(serde_json::from_str::<BlockMap<u64>>(r#"{"999":1}"#).is_err());
    }

    #[test]
    fn test_epoch_descriptor_camel_case() {
        let epoch: EpochDescriptor =
            serde_json::from_str(r#"{"begin":10,"end":19,"epochId":4,"day":1}"#).unwrap();
        assert_eq!(epoch.epoch_id, 4);
        assert_eq!(epoch.range().unwrap().len(), 10);
    }

    #[test]
    fn test_price_table_lookup() {
        let weth = address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");
        let mut table = PriceTable::default();
        table.insert(5, weth, Decimal::new(350012, 2));

        assert_eq!(table.price(5, &weth), Some(Decimal::new(350012, 2)));
        assert_eq!(table.price(6, &weth), None);
        assert_eq!(table.len(), 1);
    }
}
