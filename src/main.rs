//! # kealm
//!
//! Runs the bundle controller against in-memory stores.
//!
//! ## Startup
//!
//! 1. **Logging** - `tracing` with an `EnvFilter` (`--log-level`, else `RUST_LOG`, else `info`)
//! 2. **Configuration** - `--config` file if given, then `KEALM_*` overrides
//! 3. **Stores** - empty in-memory stores, seeded from `--state`
//! 4. **Reconciliation** - a single pass with `--once`, otherwise the loop until Ctrl+C

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

mod cli;
mod state;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use kealm_core::LabelSelector;
use kealm_reconciler::{ReconcilerBuilder, ReconcilerConfig, ReconciliationLoop};
use kealm_store::{
    InMemoryBundleStore, InMemoryPlacementDecisions, InMemoryWorkStore, TracingWorkStore,
    WorkStore,
};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;
use crate::state::SeedState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let config = load_config(cli.config.as_deref())?;
    info!(?config, "Configuration loaded");

    let bundles = InMemoryBundleStore::new_arc();
    let decisions = InMemoryPlacementDecisions::new_arc();
    let works = Arc::new(TracingWorkStore::new(InMemoryWorkStore::new()));

    if let Some(path) = cli.state.as_deref() {
        SeedState::from_file(path)?
            .apply(&bundles, &decisions)
            .await?;
    }

    let reconciler = ReconcilerBuilder::new()
        .with_bundles(bundles)
        .with_decisions(decisions)
        .with_works(works.clone())
        .with_config(config)
        .build()
        .context("Failed to build reconciler")?;
    let reconciliation = Arc::new(ReconciliationLoop::new(Arc::new(reconciler)));

    if cli.once {
        run_once(&reconciliation, works.as_ref()).await
    } else {
        run_until_shutdown(reconciliation).await
    }
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing(level: Option<&str>) {
    let filter = level.map_or_else(
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        EnvFilter::new,
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(path: Option<&Path>) -> Result<ReconcilerConfig> {
    let config = match path {
        Some(path) => ReconcilerConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?
            .apply_overrides(|key| std::env::var(key).ok()),
        None => ReconcilerConfig::from_env(),
    };
    config.context("Invalid configuration")
}

async fn run_once(
    reconciliation: &ReconciliationLoop,
    works: &TracingWorkStore<InMemoryWorkStore>,
) -> Result<()> {
    let summary = reconciliation
        .reconcile_once()
        .await
        .context("Reconciliation pass failed")?;
    for (key, e) in &summary.failed {
        error!(bundle = %key, error = %e, "Bundle failed to reconcile");
    }
    info!(
        reconciled = summary.reconciled,
        failed = summary.failed.len(),
        "Reconciliation pass complete"
    );

    let all = works
        .list(None, &LabelSelector::everything())
        .await
        .context("Failed to list manifest works")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&all).context("Failed to encode manifest works")?
    );

    if !summary.is_clean() {
        bail!("{} bundles failed to reconcile", summary.failed.len());
    }
    Ok(())
}

async fn run_until_shutdown(reconciliation: Arc<ReconciliationLoop>) -> Result<()> {
    let stopper = reconciliation.stopper();
    let handle = tokio::spawn(async move { reconciliation.run().await });

    info!("kealm is running. Press Ctrl+C to stop.");
    wait_for_shutdown().await;
    stopper.stop();

    handle
        .await
        .context("Reconciliation loop task failed")?
        .context("Reconciliation loop failed")?;
    info!("kealm stopped gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C).
async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}
