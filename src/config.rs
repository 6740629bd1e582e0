//! Snapshotter node configuration
//!
//! Loaded once at startup from the environment (`.env` supported) or a TOML
//! file, validated, then shared read-only by every processor.

use alloy_primitives::Address;
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::contracts::{known_symbol, AAVE_V3_ORACLE, AAVE_V3_POOL, DEFAULT_MONITORED_ASSETS};
use crate::processor::selector::identity_hash;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // ========== Network Settings ==========
    /// Archive node RPC URL (historical eth_call is required)
    pub rpc_url: String,

    /// Chain ID (1 = Ethereum Mainnet)
    pub chain_id: u64,

    // ========== Protocol Contracts ==========
    pub pool_address: Address,
    pub oracle_address: Address,

    // ========== Selection ==========
    /// Reserves this node may be assigned. Order is part of consensus:
    /// every node must list the same assets in the same order.
    pub monitored_assets: Vec<Address>,

    /// Hex identity of this snapshotter instance
    pub instance_id: String,

    /// Slot this instance occupies
    pub slot_id: u64,

    // ========== Rate Limiting ==========
    /// Calls per JSON-RPC batch, and in-flight header requests
    pub max_concurrent_requests: usize,
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            rpc_url: env::var("RPC_URL").unwrap_or(defaults.rpc_url),
            chain_id: parse_var("CHAIN_ID")?.unwrap_or(defaults.chain_id),
            pool_address: parse_var("POOL_ADDRESS")?.unwrap_or(defaults.pool_address),
            oracle_address: parse_var("ORACLE_ADDRESS")?.unwrap_or(defaults.oracle_address),
            monitored_assets: match env::var("MONITORED_ASSETS") {
                Ok(list) => parse_asset_list(&list)?,
                Err(_) => defaults.monitored_assets,
            },
            instance_id: env::var("INSTANCE_ID").unwrap_or(defaults.instance_id),
            slot_id: parse_var("SLOT_ID")?.unwrap_or(defaults.slot_id),
            max_concurrent_requests: parse_var("MAX_CONCURRENT_REQUESTS")?
                .unwrap_or(defaults.max_concurrent_requests),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration before computing any snapshot
    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.is_empty() || self.rpc_url.contains("YOUR_API_KEY") {
            return Err(eyre!("Invalid RPC_URL - please set an archive node URL"));
        }
        if self.monitored_assets.is_empty() {
            return Err(eyre!("MONITORED_ASSETS is empty - nothing to snapshot"));
        }
        let mut sorted = self.monitored_assets.clone();
        sorted.sort();
        sorted.dedup();
        if sorted.len() != self.monitored_assets.len() {
            return Err(eyre!("MONITORED_ASSETS contains duplicates"));
        }
        if let Err(e) = identity_hash(&self.instance_id) {
            return Err(eyre!("INSTANCE_ID is unusable for selection: {}", e));
        }
        if self.max_concurrent_requests == 0 {
            return Err(eyre!("MAX_CONCURRENT_REQUESTS must be at least 1"));
        }
        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║            AAVE SNAPSHOTTER - CONFIGURATION                ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Chain ID:          {:^40} ║", self.chain_id);
        println!("║ Max Concurrency:   {:^40} ║", self.max_concurrent_requests);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ CONTRACTS                                                  ║");
        println!("║ • Pool:   {:<48} ║", self.pool_address.to_string());
        println!("║ • Oracle: {:<48} ║", self.oracle_address.to_string());
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ SELECTION                                                  ║");
        println!("║ • Instance:        {:^40} ║", abbreviate(&self.instance_id));
        println!("║ • Slot:            {:^40} ║", self.slot_id);
        println!("║ • Assets:          {:^40} ║", self.monitored_assets.len());
        for (i, asset) in self.monitored_assets.iter().enumerate() {
            let label = known_symbol(asset).unwrap_or("?");
            println!("║   {:>2}. {:<8} {:<44} ║", i, label, asset.to_string());
        }
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: "https://eth.llamarpc.com".to_string(),
            chain_id: 1,
            pool_address: AAVE_V3_POOL,
            oracle_address: AAVE_V3_ORACLE,
            monitored_assets: DEFAULT_MONITORED_ASSETS.iter().map(|(addr, _)| *addr).collect(),
            instance_id: "0x0".to_string(),
            slot_id: 1,
            max_concurrent_requests: 16,
        }
    }
}

/// Parse an optional environment variable, failing on malformed values
fn parse_var<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| eyre!("Invalid {}={:?}: {}", key, raw, e)),
        Err(_) => Ok(None),
    }
}

/// Comma-separated addresses. Strict: a dropped entry would shift every
/// other asset's index and break cross-node agreement.
pub fn parse_asset_list(list: &str) -> Result<Vec<Address>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Address::from_str(s).map_err(|e| eyre!("Invalid monitored asset {:?}: {}", s, e)))
        .collect()
}

fn abbreviate(identity: &str) -> String {
    if identity.is_ascii() && identity.len() > 20 {
        format!("{}…{}", &identity[..10], &identity[identity.len() - 6..])
    } else {
        identity.to_string()
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.pool_address, AAVE_V3_POOL);
        assert_eq!(config.monitored_assets.len(), DEFAULT_MONITORED_ASSETS.len());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_asset_list_is_strict() {
        let assets = parse_asset_list(
            "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2, 0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48,",
        )
        .unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(known_symbol(&assets[1]), Some("USDC"));

        assert!(parse_asset_list("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2,WETH").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_selection_inputs() {
        let mut config = Config::default();
        config.monitored_assets.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.monitored_assets.push(config.monitored_assets[0]);
        assert!(config.validate().is_err());

        let config = Config { instance_id: "node-7".to_string(), ..Config::default() };
        assert!(config.validate().is_err());

        let config = Config { max_concurrent_requests: 0, ..Config::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_accepts_exactly_the_selectable_identities() {
        for identity in ["0x1f", "0X1f", "1F", "0xABCdef"] {
            let config = Config { instance_id: identity.to_string(), ..Config::default() };
            assert!(config.validate().is_ok(), "{identity}");
            assert!(identity_hash(identity).is_ok());
        }
        for identity in ["0x0xab", "0x", "", "0xzz"] {
            let config = Config { instance_id: identity.to_string(), ..Config::default() };
            assert!(config.validate().is_err(), "{identity}");
            assert!(identity_hash(identity).is_err());
        }
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config {
            instance_id: "0xabcdef".to_string(),
            slot_id: 4,
            ..Config::default()
        };
        let content = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&content).unwrap();
        assert_eq!(back, config);

        // Missing keys fall back to defaults
        let partial: Config = toml::from_str("slot_id = 9").unwrap();
        assert_eq!(partial.slot_id, 9);
        assert_eq!(partial.oracle_address, AAVE_V3_ORACLE);
    }
}
