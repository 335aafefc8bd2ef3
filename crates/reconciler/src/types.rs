//! Core types for the reconciler.

use std::fmt;

use kealm_core::{Bundle, ClusterId, DEPLOY_FINALIZER};
use kealm_store::StoreError;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a bundle as seen by the controller.
///
/// A bundle that is no longer in the store is gone; that state is never
/// observed on an object, only as [`ReconcileOutcome::Gone`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Live, finalizer not yet registered.
    Pending,
    /// Live, finalizer registered.
    Active,
    /// Deletion requested, finalizer still held: works must be swept.
    Deleting,
    /// Deletion requested, finalizer already released.
    Releasing,
}

impl LifecycleState {
    /// Classify a bundle.
    pub fn of(bundle: &Bundle) -> Self {
        let held = bundle.metadata.has_finalizer(DEPLOY_FINALIZER);
        match (bundle.metadata.is_deleting(), held) {
            (false, false) => Self::Pending,
            (false, true) => Self::Active,
            (true, true) => Self::Deleting,
            (true, false) => Self::Releasing,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Deleting => "deleting",
            Self::Releasing => "releasing",
        };
        f.write_str(name)
    }
}

/// What convergence did to one cluster's work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyAction {
    Created,
    Updated,
}

/// A cluster whose work could not be converged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFailure {
    pub cluster: ClusterId,
    pub error: StoreError,
}

impl TargetFailure {
    /// Create a target failure.
    pub const fn new(cluster: ClusterId, error: StoreError) -> Self {
        Self { cluster, error }
    }
}

/// Result of converging one bundle across its resolved clusters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvergenceReport {
    /// Clusters whose work was written, in resolution order.
    pub applied: Vec<(ClusterId, ApplyAction)>,
    /// Clusters whose work could not be written.
    pub failed: Vec<TargetFailure>,
}

impl ConvergenceReport {
    /// Whether every cluster converged.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of clusters attempted.
    pub fn attempted(&self) -> usize {
        self.applied.len().saturating_add(self.failed.len())
    }

    /// Number of works created.
    pub fn created(&self) -> usize {
        self.count(ApplyAction::Created)
    }

    /// Number of works updated.
    pub fn updated(&self) -> usize {
        self.count(ApplyAction::Updated)
    }

    fn count(&self, action: ApplyAction) -> usize {
        self.applied.iter().filter(|(_, a)| *a == action).count()
    }
}

/// Outcome of one successful reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The bundle is no longer in the store.
    Gone,
    /// The finalizer was registered; work continues on the next event.
    FinalizerAdded,
    /// The bundle names no placement.
    Unplaced,
    /// No placement decision matches the bundle's placement.
    PlacementUnresolved { placement: String },
    /// The placement resolved but the workload is empty, so nothing was scheduled.
    EmptyWorkload { clusters: usize },
    /// Every resolved cluster holds the current work.
    Converged(ConvergenceReport),
    /// Owned works were swept and the finalizer released.
    Released { deleted: usize },
    /// Deletion is in progress and the finalizer is already gone.
    Releasing,
}
