//! CLI definitions using clap.

use std::path::PathBuf;

use clap::Parser;

/// kealm - bundle distribution controller
#[derive(Parser, Debug)]
#[command(name = "kealm")]
#[command(version)]
#[command(about = "Distributes workload bundles to placement-selected clusters")]
#[command(
    long_about = "kealm keeps one manifest work per selected cluster in step with every bundle, and removes a bundle's works before letting the bundle go."
)]
pub struct Cli {
    /// Reconciler configuration file (TOML, or JSON by extension)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// YAML file seeding bundles and placement decisions
    #[arg(short, long)]
    pub state: Option<PathBuf>,

    /// Reconcile every bundle once, print the resulting works as JSON, and exit
    #[arg(long, default_value_t = false)]
    pub once: bool,

    /// Log filter, overriding RUST_LOG (e.g. "debug" or "kealm_reconciler=trace")
    #[arg(long)]
    pub log_level: Option<String>,
}
