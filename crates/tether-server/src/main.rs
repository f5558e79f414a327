//! # tether server
//!
//! Realtime friend-chat hub over WebSocket.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! tether
//!
//! # Run with custom config
//! tether  # reads ./tether.toml if present
//!
//! # Run with environment variables
//! TETHER_PORT=3001 TETHER_HOST=0.0.0.0 tether
//! ```

mod config;
mod handlers;
mod metrics;
mod session;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tether=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting tether server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
