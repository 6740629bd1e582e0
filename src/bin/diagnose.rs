//! Diagnostic tool - Check configuration and epoch assignment
//!
//! Run with: cargo run --bin diagnose -- --epoch-id 42 --day 3
//!
//! Never touches the network.

use aave_snapshotter::contracts::known_symbol;
use aave_snapshotter::processor::selector::{identity_hash, select};
use aave_snapshotter::Config;
use clap::Parser;
use console::style;
use std::env;

#[derive(Parser, Debug)]
#[command(name = "diagnose", about = "Show configuration and which asset this node snapshots")]
struct Args {
    #[arg(long = "epoch-id", default_value = "0")]
    epoch_id: u64,

    #[arg(long, default_value = "0")]
    day: u64,

    /// Also show the next N epochs
    #[arg(long, default_value = "5")]
    upcoming: u64,
}

fn main() {
    let args = Args::parse();
    println!("🔍 SNAPSHOTTER DIAGNOSTIC CHECK\n");

    println!("═══════════════════════════════════════════════════");
    println!("                  CONFIGURATION                     ");
    println!("═══════════════════════════════════════════════════\n");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            println!("  {} {}", style("❌ Could not load configuration:").red(), e);
            return;
        }
    };

    let checks = [
        ("RPC_URL", "Archive node endpoint"),
        ("CHAIN_ID", "Chain the pool lives on"),
        ("POOL_ADDRESS", "Aave V3 Pool"),
        ("ORACLE_ADDRESS", "Aave V3 price oracle"),
        ("MONITORED_ASSETS", "Reserves eligible for selection"),
        ("INSTANCE_ID", "This node's identity"),
        ("SLOT_ID", "This node's slot"),
        ("MAX_CONCURRENT_REQUESTS", "In-flight RPC requests per batch"),
    ];
    for (key, desc) in checks {
        let marker = if env::var(key).is_ok() { "(from .env)" } else { "(default)" };
        println!("  {:<24} {}", key, marker);
        println!("    └─ {}", desc);
    }
    println!();

    let rpc = &config.rpc_url;
    let rpc_display = if rpc.is_ascii() && rpc.len() > 50 {
        format!("{}...{}", &rpc[..30], &rpc[rpc.len() - 15..])
    } else {
        rpc.clone()
    };
    println!("  RPC_URL: {}\n", rpc_display);

    config.print_summary();

    println!("\n═══════════════════════════════════════════════════");
    println!("                    VALIDATION                      ");
    println!("═══════════════════════════════════════════════════\n");

    match config.validate() {
        Ok(()) => println!("  ✅ Configuration is valid"),
        Err(e) => {
            println!("  ❌ {}", e);
            return;
        }
    }

    println!("\n═══════════════════════════════════════════════════");
    println!("                 EPOCH ASSIGNMENT                   ");
    println!("═══════════════════════════════════════════════════\n");

    match identity_hash(&config.instance_id) {
        Ok(hash) => println!("  Identity hash: {}\n", hash),
        Err(e) => {
            println!("  ❌ {}", e);
            return;
        }
    }

    for epoch_id in args.epoch_id..=args.epoch_id.saturating_add(args.upcoming) {
        match select(
            epoch_id,
            args.day,
            &config.instance_id,
            config.slot_id,
            config.monitored_assets.len(),
        ) {
            Ok(index) => {
                let asset = config.monitored_assets[index];
                let line = format!(
                    "  epoch {:>8} → [{}] {:<8} {}",
                    epoch_id,
                    index,
                    known_symbol(&asset).unwrap_or("?"),
                    asset
                );
                if epoch_id == args.epoch_id {
                    println!("{}", style(line).green().bold());
                } else {
                    println!("{}", line);
                }
            }
            Err(e) => {
                println!("  ❌ {}", e);
                return;
            }
        }
    }
    println!();
}
