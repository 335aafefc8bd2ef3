//! Placement decisions produced by the external scheduler.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::constants::PLACEMENT_LABEL;
use crate::meta::{ClusterId, ObjectMeta};

/// One cluster selected by a placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDecision {
    pub cluster_name: ClusterId,
    #[serde(default)]
    pub reason: String,
}

/// Resolved cluster list of a placement decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementDecisionStatus {
    #[serde(default)]
    pub decisions: Vec<ClusterDecision>,
}

/// Read-only mapping from a placement to the clusters it currently selects.
///
/// The decision carries [`PLACEMENT_LABEL`] naming the placement it belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementDecision {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: PlacementDecisionStatus,
}

impl PlacementDecision {
    /// Create a decision for `placement` selecting `clusters`.
    pub fn new<I, C>(namespace: &str, name: &str, placement: &str, clusters: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<ClusterId>,
    {
        let metadata = ObjectMeta::new(namespace, name).with_label(PLACEMENT_LABEL, placement);
        let decisions = clusters
            .into_iter()
            .map(|c| ClusterDecision {
                cluster_name: c.into(),
                reason: String::new(),
            })
            .collect();
        Self {
            metadata,
            status: PlacementDecisionStatus { decisions },
        }
    }

    /// Name of the placement this decision belongs to.
    pub fn placement_name(&self) -> Option<&str> {
        self.metadata.label(PLACEMENT_LABEL)
    }

    /// Selected clusters in decision order, without duplicates.
    pub fn clusters(&self) -> Vec<ClusterId> {
        self.status
            .decisions
            .iter()
            .map(|d| d.cluster_name.clone())
            .unique()
            .collect()
    }
}
