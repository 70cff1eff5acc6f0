//! Phantom Token Agent
//!
//! Gateway plugin implementing the phantom token pattern: clients present
//! opaque access tokens, the agent exchanges them for JWTs at the identity
//! provider's introspection endpoint (caching the result), and only the JWT
//! is forwarded upstream.

mod cache;
mod config;
mod introspection;
mod phantom;
mod server;
mod token;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use cache::JwtCache;
use config::{Args, PhantomConfig};
use introspection::IntrospectionClient;
use phantom::PhantomAgent;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("{}={}", env!("CARGO_CRATE_NAME"), log_level))
        .json()
        .init();

    info!("Starting Phantom Token Agent");

    let config = PhantomConfig::from_args(&args)?;

    info!(
        introspection_url = %config.introspection_url,
        client_id = %config.client_id,
        timeout_ms = config.timeout.as_millis() as u64,
        cache_max_entries = ?config.cache_max_entries,
        janitor_interval_secs = config.janitor_interval.as_secs(),
        clock_skew_secs = config.clock_skew.num_seconds(),
        "Configuration loaded"
    );

    let cache = Arc::new(JwtCache::new(config.cache_max_entries, config.clock_skew));
    info!("Starting JWT cache janitor");
    cache.start_janitor(config.janitor_interval);

    let introspector = IntrospectionClient::new(
        config.introspection_url.clone(),
        config.client_id.clone(),
        config.client_secret.clone(),
        config.timeout,
    )
    .context("Failed to create introspection client")?;

    let agent = PhantomAgent::new(Arc::clone(&cache), Arc::new(introspector));

    let result = server::serve(config.port, Arc::new(agent)).await;

    cache.stop_janitor();
    info!("Phantom Token Agent stopped");
    result
}
