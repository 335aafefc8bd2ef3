//! Placement resolution.

use std::sync::Arc;

use kealm_core::{ClusterId, LabelSelector, PLACEMENT_LABEL};
use kealm_store::PlacementDecisionLister;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Resolves a placement name to the clusters it currently selects.
///
/// Decisions are read fresh on every call.
#[derive(Clone)]
pub struct PlacementResolver {
    decisions: Arc<dyn PlacementDecisionLister>,
}

impl PlacementResolver {
    /// Create a resolver over a decision index.
    pub fn new(decisions: Arc<dyn PlacementDecisionLister>) -> Self {
        Self { decisions }
    }

    /// Clusters selected by `placement` in `namespace`.
    ///
    /// When several decisions match, the first in store order wins.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PlacementNotResolved`] when no decision matches and
    /// [`Error::Store`] when the index cannot be read.
    pub async fn resolve(&self, placement: &str, namespace: &str) -> Result<Vec<ClusterId>> {
        let selector = LabelSelector::everything().with_equals(PLACEMENT_LABEL, placement);
        let decisions = self.decisions.list(namespace, &selector).await?;

        if decisions.len() > 1 {
            warn!(
                placement,
                namespace,
                matches = decisions.len(),
                "Multiple placement decisions match, using the first"
            );
        }

        let decision = decisions
            .into_iter()
            .next()
            .ok_or_else(|| Error::placement_not_resolved(placement, namespace))?;
        let clusters = decision.clusters();

        debug!(
            placement,
            decision = %decision.metadata.key(),
            clusters = clusters.len(),
            "Resolved placement"
        );
        Ok(clusters)
    }
}
