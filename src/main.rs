// src/main.rs

//! Entry point for the tablemaster binary: loads configuration, sets up
//! reloadable structured logging, and runs the master until it shuts down.

use anyhow::Result;
use std::env;
use std::sync::Arc;
use tablemaster::config::Config;
use tablemaster::server;
use tracing::error;
use tracing_subscriber::{filter::EnvFilter, prelude::*, reload};

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

async fn run_app() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("tablemaster version {VERSION}");
        return Ok(());
    }

    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("tablemaster.toml");

    let mut config = match Config::from_file(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e}");
            std::process::exit(1);
        }
    };

    if args.contains(&"--backup".to_string()) {
        config.backup = true;
    }

    let initial_log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    let (filter, reload_handle) = reload::Layer::new(EnvFilter::new(initial_log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact().with_ansi(true))
        .init();

    // Kept for future admin-triggered log-level changes; the master itself
    // does not yet expose an RPC for it.
    let _reload_handle = Arc::new(reload_handle);

    if let Err(e) = server::run(config).await {
        error!(error = %e, "master exited with an error");
        return Err(e);
    }

    Ok(())
}
