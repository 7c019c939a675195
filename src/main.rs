//! MirrorGrid - grid click calibration for mirrored phone windows
//!
//! Clicks a 3x3 grid across the mirrored phone window, records where each
//! sample landed relative to the window, and lets the user fine-tune the
//! mapping over a screenshot before writing the final per-cell coordinates.

mod automation;
mod config;
mod controller;
mod error;
mod grid;
mod grid_pass;
mod overlay;
mod records;
mod scale;
mod server;
mod session;
mod store;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::automation::MacAutomation;

/// MirrorGrid - grid click calibration for mirrored phone windows
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "mirrorgrid.toml")]
    config: PathBuf,

    /// Web server host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Web server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("MirrorGrid v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config::Config::load_or_create(&args.config)?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.storage.ensure_dirs()?;

    info!("Target process: {}", config.automation.process_name);
    info!(
        "Grid: {}x{} over {:.0}%..{:.0}% of window height",
        config.grid.cols,
        config.grid.rows,
        config.grid.start_fraction * 100.0,
        config.grid.end_fraction * 100.0
    );
    info!("Screenshots: {:?}", config.storage.screenshot_dir);
    info!("Calibration files: {:?}", config.storage.calibration_dir);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let automation = Arc::new(MacAutomation::new(&config.automation));
    let state = Arc::new(server::AppState::new(config, automation));

    info!("Starting web server at http://{}", addr);
    let server_handle = tokio::spawn(async move { server::run_server(&addr, state).await });

    tokio::select! {
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => tracing::error!("Server error: {}", e),
                Err(e) => tracing::error!("Server task panicked: {}", e),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
    }

    Ok(())
}
