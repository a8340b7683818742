// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use secretsync::config::Config;
use secretsync::constants::env;
use secretsync::sync::Syncer;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_env(env::LOG_FILTER).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting secretsync agent");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        "Configuration loaded: server={}, secrets_directory={}",
        config.server,
        config.secrets_directory.display()
    );

    let syncer = Syncer::new(config).context("Failed to create syncer")?;

    // Returns after one pass when no poll interval is configured
    syncer.run().await.context("Sync failed")?;

    info!("Single sync pass complete");
    Ok(())
}
