//! Aave V3 contract addresses and ABIs
//!
//! All addresses are Ethereum Mainnet deployments.

use alloy_primitives::{address, Address};
use alloy_sol_types::sol;

// ============================================
// AAVE V3 CORE CONTRACTS
// ============================================

/// Aave V3 Pool (reserve data, reserve list, trade events)
pub const AAVE_V3_POOL: Address = address!("87870Bca3F3fD6335C3F4ce8392D69350B4fA4E2");

/// Aave V3 price oracle (USD, 8 decimals)
pub const AAVE_V3_ORACLE: Address = address!("54586bE62E3c3580375aE3723C145253060Ca0C2");

/// Aave V3 PoolDataProvider, used as the authoritative reserve read
pub const AAVE_V3_POOL_DATA_PROVIDER: Address = address!("7B4EB56E7CD4b454BA8ff71E4518426369a138a3");

/// Reserves tracked when no MONITORED_ASSETS list is configured.
/// Order matters: the pair selector indexes into this list.
pub const DEFAULT_MONITORED_ASSETS: &[(Address, &str)] = &[
    (address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"), "WETH"),
    (address!("7f39C581F595B53c5cb19bD0b3f8dA6c935E2Ca0"), "wstETH"),
    (address!("2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599"), "WBTC"),
    (address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"), "USDC"),
    (address!("6B175474E89094C44Da98b954EedcdeCB5BE3830"), "DAI"),
    (address!("514910771AF9Ca656af840dff83E8264EcF986CA"), "LINK"),
    (address!("7Fc66500c84A76Ad7e9c93437bFc5Ac33E2DDaE9"), "AAVE"),
    (address!("dAC17F958D2ee523a2206206994597C13D831ec7"), "USDT"),
];

/// Symbol for a default monitored asset, for log output only
pub fn known_symbol(asset: &Address) -> Option<&'static str> {
    DEFAULT_MONITORED_ASSETS
        .iter()
        .find(|(addr, _)| addr == asset)
        .map(|(_, symbol)| *symbol)
}

// ============================================
// SOLIDITY INTERFACES
// ============================================

sol! {
    /// Aave V3 Pool: reserve state and the events the volume snapshot sums
    interface IPool {
        struct ReserveConfigurationMap {
            uint256 data;
        }

        struct ReserveData {
            ReserveConfigurationMap configuration;
            uint128 liquidityIndex;
            uint128 currentLiquidityRate;
            uint128 variableBorrowIndex;
            uint128 currentVariableBorrowRate;
            uint128 currentStableBorrowRate;
            uint40 lastUpdateTimestamp;
            uint16 id;
            address aTokenAddress;
            address stableDebtTokenAddress;
            address variableDebtTokenAddress;
            address interestRateStrategyAddress;
            uint128 accruedToTreasury;
            uint128 unbacked;
            uint128 isolationModeTotalDebt;
        }

        function getReserveData(address asset) external view returns (ReserveData memory);
        function getReservesList() external view returns (address[] memory);

        event Supply(
            address indexed reserve,
            address user,
            address indexed onBehalfOf,
            uint256 amount,
            uint16 indexed referralCode
        );
        event Withdraw(
            address indexed reserve,
            address indexed user,
            address indexed to,
            uint256 amount
        );
        event Borrow(
            address indexed reserve,
            address user,
            address indexed onBehalfOf,
            uint256 amount,
            uint8 interestRateMode,
            uint256 borrowRate,
            uint16 indexed referralCode
        );
        event Repay(
            address indexed reserve,
            address indexed user,
            address indexed repayer,
            uint256 amount,
            bool useATokens
        );
        event LiquidationCall(
            address indexed collateralAsset,
            address indexed debtAsset,
            address indexed user,
            uint256 debtToCover,
            uint256 liquidatedCollateralAmount,
            address liquidator,
            bool receiveAToken
        );
    }

    /// Aave oracle: prices in USD with 8 decimals, same order as the input list
    interface IAaveOracle {
        function getAssetsPrices(address[] calldata assets) external view returns (uint256[] memory);
        function getAssetPrice(address asset) external view returns (uint256);
    }

    interface IERC20 {
        function totalSupply() external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
    }

    /// Variable debt token (balances stored divided by the borrow index)
    interface IScaledBalanceToken {
        function scaledTotalSupply() external view returns (uint256);
    }

    interface IStableDebtToken {
        function getSupplyData() external view returns (
            uint256 principalSupply,
            uint256 totalSupply,
            uint256 avgStableRate,
            uint40 lastUpdateTimestamp
        );
    }

    /// DefaultReserveInterestRateStrategy (all values ray)
    interface IReserveInterestRateStrategy {
        function getVariableRateSlope1() external view returns (uint256);
        function getVariableRateSlope2() external view returns (uint256);
        function getStableRateSlope1() external view returns (uint256);
        function getStableRateSlope2() external view returns (uint256);
        function getBaseVariableBorrowRate() external view returns (uint256);
        function OPTIMAL_USAGE_RATIO() external view returns (uint256);
    }

    interface IPoolDataProvider {
        function getReserveData(address asset) external view returns (
            uint256 unbacked,
            uint256 accruedToTreasuryScaled,
            uint256 totalAToken,
            uint256 totalStableDebt,
            uint256 totalVariableDebt,
            uint256 liquidityRate,
            uint256 variableBorrowRate,
            uint256 stableBorrowRate,
            uint256 averageStableBorrowRate,
            uint256 liquidityIndex,
            uint256 variableBorrowIndex,
            uint40 lastUpdateTimestamp
        );
    }
}
