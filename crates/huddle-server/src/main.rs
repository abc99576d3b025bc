//! # Huddle Server
//!
//! Realtime chat relay: rooms, presence and private messages over WebSocket.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! huddle
//!
//! # Run with custom config
//! huddle --config /path/to/huddle.toml
//!
//! # Run with environment variables
//! HUDDLE_PORT=8080 HUDDLE_HOST=0.0.0.0 huddle
//! HUDDLE__ROOMS__NAMES=general,random huddle
//! ```

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "huddle")]
#[command(about = "Realtime chat relay with rooms, presence and private messages")]
#[command(version)]
struct Args {
    /// Load this TOML file instead of searching the default locations
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "huddle=debug,huddle_core=debug,huddle_transport=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match args.config {
        Some(path) => config::Config::from_file(path)?,
        None => config::Config::load()?,
    };

    tracing::info!("Starting Huddle server on {}:{}", config.host, config.port);
    tracing::info!("Rooms: {}", config.rooms.names.join(", "));

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_config_flag() {
        let args = Args::try_parse_from(["huddle", "--config", "/tmp/huddle.toml"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/tmp/huddle.toml")));

        let args = Args::try_parse_from(["huddle", "-c", "local.toml"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("local.toml")));

        assert!(Args::try_parse_from(["huddle"]).unwrap().config.is_none());
        assert!(Args::try_parse_from(["huddle", "--config"]).is_err());
        assert!(Args::try_parse_from(["huddle", "--bogus"]).is_err());
    }
}
