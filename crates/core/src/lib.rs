//! Object model shared by the bundle controller and its stores.
//!
//! - [`Bundle`] is the desired-state object: a workload payload plus an
//!   optional placement reference carried as a label.
//! - [`PlacementDecision`] is produced by an external scheduler and maps a
//!   placement to a set of clusters.
//! - [`ManifestWork`] is the per-cluster replica of a bundle, tied back to its
//!   owner through the [`OWNED_BY_LABEL`] label rather than a structural
//!   reference.
//!
//! All objects share [`ObjectMeta`], which carries identity, labels,
//! finalizers, and the store-assigned resource version used for optimistic
//! concurrency.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod bundle;
pub mod constants;
pub mod error;
pub mod labels;
pub mod meta;
pub mod placement;
pub mod work;

pub use bundle::{
    Bundle, BundleSpec, BundleStatus, Condition, ConditionStatus, Manifest, Workload,
};
pub use constants::{
    CONDITION_PLACEMENT_RESOLVED, CONDITION_WORKLOAD_CONVERGED, DEPLOY_FINALIZER,
    OWNED_BY_LABEL, PLACEMENT_LABEL,
};
pub use error::{Error, Result};
pub use labels::{LabelSelector, Labels, Requirement};
pub use meta::{ClusterId, ObjectKey, ObjectMeta, ResourceVersion, Uid};
pub use placement::{ClusterDecision, PlacementDecision, PlacementDecisionStatus};
pub use work::{ManifestWork, ManifestWorkSpec};
