//! Remedy Daemon - incident remediation workflow engine.
//!
//! Gathers evidence about detected incidents, plans ranked fixes, proves
//! them safe via server-side dry-run, applies confirmed mutations exactly
//! once, and verifies the outcome asynchronously.

use anyhow::Result;
use remedy_common::RemedyConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

use remedyd::server;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("remedyd v{} starting", env!("CARGO_PKG_VERSION"));

    let config = RemedyConfig::load();
    let state = server::AppState::from_config(config)?;

    server::run(state).await
}
