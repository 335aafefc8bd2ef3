//! Per-cluster manifest work convergence.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use kealm_core::{Bundle, ClusterId, ManifestWork};
use kealm_store::{StoreError, WorkStore};
use tracing::{debug, warn};

use crate::synth::synthesize;
use crate::types::{ApplyAction, ConvergenceReport, TargetFailure};

/// Makes each target cluster's work match the bundle.
///
/// Every resolved cluster is attempted; a failure on one cluster never stops
/// the others. Conflicts are reported, not retried.
#[derive(Clone)]
pub struct ConvergenceEngine {
    works: Arc<dyn WorkStore>,
    max_concurrent: usize,
}

impl ConvergenceEngine {
    /// Create an engine converging up to `max_concurrent` clusters at once.
    pub fn new(works: Arc<dyn WorkStore>, max_concurrent: usize) -> Self {
        Self {
            works,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Converge `bundle` onto every cluster in `clusters`.
    pub async fn converge(&self, bundle: &Bundle, clusters: &[ClusterId]) -> ConvergenceReport {
        let outcomes: Vec<(ClusterId, Result<ApplyAction, StoreError>)> =
            stream::iter(clusters.iter().cloned())
                .map(|cluster| async move {
                    debug!(bundle = %bundle.key(), cluster = %cluster, "Synthesizing work");
                    let outcome = self.apply(synthesize(bundle, &cluster)).await;
                    (cluster, outcome)
                })
                .buffered(self.max_concurrent)
                .collect()
                .await;

        outcomes
            .into_iter()
            .fold(ConvergenceReport::default(), |mut report, (cluster, outcome)| {
                match outcome {
                    Ok(action) => {
                        debug!(
                            bundle = %bundle.key(),
                            cluster = %cluster,
                            action = ?action,
                            "Work applied"
                        );
                        report.applied.push((cluster, action));
                    }
                    Err(error) => {
                        warn!(
                            bundle = %bundle.key(),
                            cluster = %cluster,
                            error = %error,
                            "Work apply failed"
                        );
                        report.failed.push(TargetFailure::new(cluster, error));
                    }
                }
                report
            })
    }

    /// Create `desired` if absent, otherwise overwrite the stored work's spec,
    /// labels, and annotations.
    ///
    /// The update is issued even when the stored work already matches.
    ///
    /// # Errors
    ///
    /// Returns the store error of the failing read or write.
    pub async fn apply(&self, desired: ManifestWork) -> Result<ApplyAction, StoreError> {
        let cluster = ClusterId::new(desired.metadata.namespace.clone());

        match self.works.get(&cluster, &desired.metadata.name).await {
            Ok(mut existing) => {
                existing.spec = desired.spec;
                existing.metadata.labels = desired.metadata.labels;
                existing.metadata.annotations = desired.metadata.annotations;
                self.works.update(&existing).await?;
                Ok(ApplyAction::Updated)
            }
            Err(e) if e.is_not_found() => {
                self.works.create(&desired).await?;
                Ok(ApplyAction::Created)
            }
            Err(e) => Err(e),
        }
    }
}
