//! Aave Snapshotter - compute one epoch's snapshot
//!
//! Run with: cargo run -- --begin 19000000 --end 19000009 --epoch-id 1 total-supply

use aave_snapshotter::sampler::PriceSampler;
use aave_snapshotter::{
    Config, EpochDescriptor, RpcChainReader, SnapshotProcessor, TotalSupplyProcessor,
    VolumeProcessor,
};
use clap::{Parser, ValueEnum};
use color_eyre::eyre::{eyre, Result};
use console::style;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Kind {
    /// Per-block reserve state
    TotalSupply,
    /// Borrow / repay / supply / withdraw / liquidation volume
    Volume,
    /// Oracle price of every reserve at every block
    Prices,
}

#[derive(Parser, Debug)]
#[command(name = "snapshotter", about = "Compute an Aave V3 snapshot for one epoch")]
struct Args {
    /// First block of the epoch (inclusive)
    #[arg(long)]
    begin: u64,

    /// Last block of the epoch (inclusive)
    #[arg(long)]
    end: u64,

    #[arg(long = "epoch-id", default_value = "0")]
    epoch_id: u64,

    #[arg(long, default_value = "0")]
    day: u64,

    /// TOML configuration file (environment / .env when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Snapshot kind
    #[arg(value_enum, default_value = "total-supply")]
    kind: Kind,
}

fn print_banner(kind: Kind, epoch: &EpochDescriptor) {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 📸 AAVE SNAPSHOTTER").cyan().bold()
    );
    println!(
        "{}",
        style(format!(
            "    {:?} | epoch {} | day {} | blocks {} - {}",
            kind, epoch.epoch_id, epoch.day, epoch.begin, epoch.end
        ))
        .cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("aave_snapshotter=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let epoch = EpochDescriptor {
        begin: args.begin,
        end: args.end,
        epoch_id: args.epoch_id,
        day: args.day,
    };
    print_banner(args.kind, &epoch);

    // Load configuration
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your .env file");
        return Err(e);
    }
    config.print_summary();
    println!();

    let config = Arc::new(config);
    let reader = Arc::new(RpcChainReader::new(
        config.rpc_url.clone(),
        config.max_concurrent_requests,
    ));
    let started = Instant::now();

    let outcome = match args.kind {
        Kind::TotalSupply => {
            let processor = TotalSupplyProcessor::new(reader, config.clone());
            processor.compute(&epoch).await.map(|s| print_json(&s))
        }
        Kind::Volume => {
            let processor = VolumeProcessor::new(reader, config.clone());
            processor.compute(&epoch).await.map(|s| print_json(&s))
        }
        Kind::Prices => {
            let sampler = PriceSampler::new(reader, config.pool_address, config.oracle_address);
            match epoch.range() {
                Ok(range) => sampler.sample_prices(range).await.map(|t| print_json(&t)),
                Err(e) => Err(e),
            }
        }
    };

    match outcome {
        Ok(printed) => printed?,
        Err(e) => {
            if e.is_data_error() {
                error!("❌ Chain data incomplete for epoch {}: {}", epoch.epoch_id, e);
                error!("   Is RPC_URL an archive node?");
            } else {
                error!("❌ Snapshot failed: {}", e);
            }
            return Err(eyre!("snapshot failed: {}", e));
        }
    }

    info!("✅ {:?} snapshot for epoch {} done in {:?}", args.kind, epoch.epoch_id, started.elapsed());
    println!(
        "{}",
        style(format!("Done in {:.2}s", started.elapsed().as_secs_f64())).green().bold()
    );

    Ok(())
}
