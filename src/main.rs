//! Playlist API gateway.
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                 GATEWAY                      │
//!     Client Request     │  ┌──────────┐    ┌──────────────┐            │
//!     ───────────────────┼─▶│  http    │───▶│ rate limiter │            │
//!                        │  │  server  │    │ (per client) │            │
//!                        │  └──────────┘    └──────┬───────┘            │
//!                        │                         │                    │
//!                        │          ┌──────────────┴──────────┐         │
//!                        │          ▼                         ▼         │
//!                        │  ┌──────────────┐         ┌──────────────┐   │
//!                        │  │ /api/v1/files│         │    proxy     │───┼──▶ Playlist API
//!                        │  └──────┬───────┘         └──────────────┘   │
//!                        │         ▼                                    │
//!                        │  ┌──────────────┐                            │
//!                        │  │   circuit    │────────────────────────────┼──▶ Object Storage
//!                        │  │   breaker    │                            │
//!                        │  └──────────────┘                            │
//!                        └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use playlist_gateway::config::{load_config, unaffordable_costs, GatewayConfig};
use playlist_gateway::lifecycle::startup;
use playlist_gateway::observability::logging;

#[derive(Parser)]
#[command(name = "playlist-gateway")]
#[command(about = "Rate limiting and storage circuit breaking for the playlist API", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Load and validate the configuration, then exit.
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    if cli.validate {
        for unaffordable in unaffordable_costs(&config.rate_limit) {
            println!("warning: {unaffordable}");
        }
        println!("Configuration is valid");
        return Ok(());
    }

    logging::init_logging(&config.observability);
    tracing::info!("playlist-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    startup::run(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
