//! wasmio Server
//!
//! Serves `/api/event` over an in-memory event table.

#![warn(missing_docs)]
#![warn(clippy::all)]

use anyhow::{Result, anyhow};
use clap::Parser;
use std::path::PathBuf;
use wasmio_server::{ApiServer, AppState, ServerConfig};
use wasmio_wasm::{logging, registry, set_panic_hook};

#[derive(Parser)]
#[command(name = "wasmio-server")]
#[command(about = "wasmio event service", long_about = None)]
struct Args {
    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address
    #[arg(short, long)]
    bind: Option<String>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long)]
    log_filter: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::new(),
    };
    if let Some(bind) = args.bind {
        config = config.with_bind(bind);
    }
    if let Some(filter) = args.log_filter {
        config = config.with_log_filter(filter);
    }

    logging::init_logs_with(&config.log_filter);
    set_panic_hook();
    let panic_registry = registry::install();

    let state = AppState::new(config).with_panic_registry(panic_registry.registry());
    let seeded = state
        .seed()
        .await
        .map_err(|raised| anyhow!("failed to seed events: {}", raised))?;
    tracing::info!("seeded {} events", seeded);

    ApiServer::new(state).serve().await?;

    drop(panic_registry);
    Ok(())
}
