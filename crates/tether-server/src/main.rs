//! # Tether Server
//!
//! Realtime messaging server for the Tether platform.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! tether
//!
//! # Run with custom config
//! tether   # reads tether.toml from the working directory
//!
//! # Run with environment variables
//! TETHER_PORT=8080 TETHER_HOST=0.0.0.0 TETHER_JWT_SECRET=... tether
//! ```

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use std::sync::Arc;
use tether_core::{Authenticator, Hub, HubConfig, JwtVerifier, MemoryStore, MessagePipeline};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tether=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Tether server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    let hub = Arc::new(Hub::with_config(HubConfig {
        channel_capacity: config.limits.channel_capacity,
        auto_delete_empty_channels: true,
    }));

    // The in-process store backs standalone runs; platform deployments wire
    // their database-backed store implementations in here instead.
    let store = Arc::new(MemoryStore::new());
    let verifier = Arc::new(JwtVerifier::new(&config.auth.jwt_secret));

    let authenticator = Authenticator::new(verifier, store.clone());
    let pipeline = MessagePipeline::new(hub.clone(), store.clone(), store)
        .with_max_message_chars(config.limits.max_message_chars);

    let state = Arc::new(handlers::AppState {
        hub,
        authenticator,
        pipeline,
        config,
    });

    // Start the server
    handlers::run_server(state).await?;

    Ok(())
}
