//! rpchost provider node.
//!
//! Loads the provider configuration, registers the bundled services and
//! serves them until interrupted.

mod services;

use anyhow::{Context, Result};
use clap::Parser;
use rpchost_core::{ProviderConfig, RpcProvider};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rpchost-provider")]
#[command(about = "Publish RPC services over TCP")]
struct Args {
    /// Configuration file (rpcserverip=..., rpcserverport=...)
    #[arg(short = 'i', long = "config", value_name = "CONFIGFILE")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging; RUST_LOG takes precedence over --debug
    let default_level = if args.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let config = ProviderConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    info!("Loaded configuration from {}", args.config.display());

    let registry = services::build_registry().context("registering services")?;

    RpcProvider::new(config, registry).run().await?;

    info!("Provider stopped");
    Ok(())
}
