//! Well-known identifiers shared with external tooling.
//!
//! These values are part of the wire contract: anything inspecting bundles or
//! manifest works on a hub must agree on them.

/// Label on a bundle naming the placement its workload is distributed by.
///
/// Placement decisions carry the same label pointing back at their placement.
pub const PLACEMENT_LABEL: &str = "cluster.open-cluster-management.io/placement";

/// Label on a manifest work holding the UID of the bundle that owns it.
pub const OWNED_BY_LABEL: &str = "cluster.open-cluster-management.io/owned-by";

/// Finalizer token blocking bundle removal until its works are swept.
pub const DEPLOY_FINALIZER: &str = "app.open-cluster-management.io/deploy-finalizer";

/// Condition type reporting whether the bundle's placement resolved.
pub const CONDITION_PLACEMENT_RESOLVED: &str = "PlacementResolved";

/// Condition type reporting whether every resolved cluster holds a current work.
pub const CONDITION_WORKLOAD_CONVERGED: &str = "WorkloadConverged";
