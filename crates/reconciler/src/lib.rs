//! Finalizer-gated reconciliation of bundles into per-cluster manifest works.
//!
//! A bundle carries a workload and names a placement. The scheduler records
//! which clusters the placement selected in a placement decision. This crate
//! keeps one manifest work per selected cluster in step with the bundle:
//!
//! - **Register**: the first pass over a live bundle adds the deploy finalizer
//!   and does nothing else.
//! - **Distribute**: later passes resolve the placement and create or
//!   overwrite the bundle's work on every selected cluster.
//! - **Release**: once deletion is requested, every work labelled with the
//!   bundle's UID is deleted, then the finalizer is removed.
//!
//! Errors are never retried internally. The [`ReconciliationLoop`] requeues a
//! failed bundle with backoff and the next pass starts from a fresh read.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use kealm_reconciler::{ReconcilerBuilder, ReconciliationLoop};
//! use kealm_store::{InMemoryBundleStore, InMemoryPlacementDecisions, InMemoryWorkStore};
//!
//! #[tokio::main]
//! async fn main() -> kealm_reconciler::Result<()> {
//!     let reconciler = ReconcilerBuilder::new()
//!         .with_bundles(InMemoryBundleStore::new_arc())
//!         .with_decisions(InMemoryPlacementDecisions::new_arc())
//!         .with_works(InMemoryWorkStore::new_arc())
//!         .build()?;
//!
//!     let reconciliation = ReconciliationLoop::new(Arc::new(reconciler));
//!     reconciliation.run().await
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod config;
pub mod converge;
pub mod error;
pub mod r#loop;
pub mod placement;
pub mod queue;
pub mod reconciler;
pub mod sweep;
pub mod synth;
pub mod types;

// Re-export main types
pub use config::ReconcilerConfig;
pub use converge::ConvergenceEngine;
pub use error::{Error, Result};
pub use r#loop::{LoopStopper, PassSummary, ReconciliationLoop, reconcile_with_deadline};
pub use placement::PlacementResolver;
pub use queue::WorkQueue;
pub use reconciler::{Reconciler, ReconcilerBuilder};
pub use sweep::OwnershipSweeper;
pub use synth::synthesize;
pub use types::{ApplyAction, ConvergenceReport, LifecycleState, ReconcileOutcome, TargetFailure};
