//! Reconciler implementation.

use std::sync::Arc;

use itertools::Itertools;
use kealm_core::{
    Bundle, CONDITION_PLACEMENT_RESOLVED, CONDITION_WORKLOAD_CONVERGED, ClusterId, Condition,
    DEPLOY_FINALIZER, ObjectKey,
};
use kealm_store::{BundleStore, PlacementDecisionLister, WorkStore};
use tracing::{debug, info, warn};

use crate::config::ReconcilerConfig;
use crate::converge::ConvergenceEngine;
use crate::error::{Error, Result};
use crate::placement::PlacementResolver;
use crate::sweep::OwnershipSweeper;
use crate::types::{ConvergenceReport, LifecycleState, ReconcileOutcome};

/// Finalizer-gated controller distributing bundles to their placement's clusters.
///
/// Each call to [`Reconciler::reconcile`] reads the bundle fresh and takes one
/// step of its lifecycle. Failures are returned, never retried here, so the
/// caller redelivers the key and every step must be safe to repeat.
pub struct Reconciler {
    bundles: Arc<dyn BundleStore>,
    resolver: PlacementResolver,
    engine: ConvergenceEngine,
    sweeper: OwnershipSweeper,
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(
        bundles: Arc<dyn BundleStore>,
        decisions: Arc<dyn PlacementDecisionLister>,
        works: Arc<dyn WorkStore>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            bundles,
            resolver: PlacementResolver::new(decisions),
            engine: ConvergenceEngine::new(Arc::clone(&works), config.max_concurrent_targets),
            sweeper: OwnershipSweeper::new(works),
            config,
        }
    }

    /// Reconcile the bundle identified by `key`.
    ///
    /// # Errors
    ///
    /// Returns a retryable error when any store call fails, when a write loses
    /// an optimistic-concurrency race, when any cluster fails to converge, or
    /// when the sweep cannot delete an owned work.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome> {
        let bundle = match self.bundles.get(key).await {
            Ok(bundle) => bundle,
            Err(e) if e.is_not_found() => {
                debug!(bundle = %key, "Bundle not found, nothing to do");
                return Ok(ReconcileOutcome::Gone);
            }
            Err(e) => return Err(e.into()),
        };

        let state = LifecycleState::of(&bundle);
        debug!(bundle = %key, state = %state, "Reconciling bundle");

        match state {
            LifecycleState::Pending => self.register_finalizer(bundle).await,
            LifecycleState::Active => self.distribute(bundle).await,
            LifecycleState::Deleting => self.release(bundle).await,
            LifecycleState::Releasing => Ok(ReconcileOutcome::Releasing),
        }
    }

    async fn register_finalizer(&self, mut bundle: Bundle) -> Result<ReconcileOutcome> {
        bundle.metadata.add_finalizer(DEPLOY_FINALIZER);
        self.bundles.update(&bundle).await?;
        info!(bundle = %bundle.key(), "Finalizer registered");
        Ok(ReconcileOutcome::FinalizerAdded)
    }

    async fn release(&self, mut bundle: Bundle) -> Result<ReconcileOutcome> {
        let deleted = self.sweeper.sweep(&bundle.metadata.uid).await?;

        bundle.metadata.remove_finalizer(DEPLOY_FINALIZER);
        self.bundles.update(&bundle).await?;
        info!(bundle = %bundle.key(), deleted, "Works swept, finalizer released");
        Ok(ReconcileOutcome::Released { deleted })
    }

    async fn distribute(&self, bundle: Bundle) -> Result<ReconcileOutcome> {
        let key = bundle.key();
        let Some(placement) = bundle.placement_ref().map(str::to_string) else {
            info!(bundle = %key, "No placement label found on bundle");
            self.record_status(
                &bundle,
                vec![Condition::new(
                    CONDITION_PLACEMENT_RESOLVED,
                    false,
                    "NoPlacement",
                    "bundle carries no placement label",
                )],
            )
            .await;
            return Ok(ReconcileOutcome::Unplaced);
        };

        let clusters = match self.resolver.resolve(&placement, &key.namespace).await {
            Ok(clusters) => clusters,
            Err(Error::PlacementNotResolved { .. }) => {
                info!(bundle = %key, placement, "No placement decision found");
                self.record_status(
                    &bundle,
                    vec![Condition::new(
                        CONDITION_PLACEMENT_RESOLVED,
                        false,
                        "DecisionNotFound",
                        format!("no decision for placement '{placement}'"),
                    )],
                )
                .await;
                return Ok(ReconcileOutcome::PlacementUnresolved { placement });
            }
            Err(e) => return Err(e),
        };
        info!(
            bundle = %key,
            placement,
            clusters = %clusters.iter().join(","),
            "Placement resolved"
        );

        let resolved = Condition::new(
            CONDITION_PLACEMENT_RESOLVED,
            true,
            "Resolved",
            format!("{} clusters selected", clusters.len()),
        );

        if bundle.spec.workload.is_empty() {
            debug!(bundle = %key, "Workload is empty, skipping scheduling");
            self.record_status(
                &bundle,
                vec![
                    resolved,
                    Condition::new(
                        CONDITION_WORKLOAD_CONVERGED,
                        false,
                        "EmptyWorkload",
                        "bundle has no manifests to schedule",
                    ),
                ],
            )
            .await;
            return Ok(ReconcileOutcome::EmptyWorkload {
                clusters: clusters.len(),
            });
        }

        let report = self.engine.converge(&bundle, &clusters).await;
        let status = self
            .write_status(&bundle, vec![resolved, converged_condition(&report, &clusters)])
            .await;

        if !report.is_complete() {
            if let Err(e) = status {
                warn!(bundle = %key, error = %e, "Failed to record convergence status");
            }
            return Err(Error::convergence(report.attempted(), report.failed));
        }
        status?;

        info!(
            bundle = %key,
            created = report.created(),
            updated = report.updated(),
            "Bundle converged"
        );
        Ok(ReconcileOutcome::Converged(report))
    }

    /// Write conditions for an outcome that leaves nothing to retry. A failed
    /// write is logged and picked up again on the next pass.
    async fn record_status(&self, bundle: &Bundle, conditions: Vec<Condition>) {
        if let Err(e) = self.write_status(bundle, conditions).await {
            warn!(bundle = %bundle.key(), error = %e, "Failed to record status");
        }
    }

    /// Write conditions onto the bundle status when reporting is enabled and
    /// something changed.
    async fn write_status(&self, bundle: &Bundle, conditions: Vec<Condition>) -> Result<()> {
        if !self.config.report_status {
            return Ok(());
        }

        let mut next = bundle.clone();
        let changed = conditions
            .into_iter()
            .fold(false, |changed, c| next.status.set_condition(c) || changed);
        if changed {
            self.bundles.update_status(&next).await?;
            debug!(bundle = %bundle.key(), "Status updated");
        }
        Ok(())
    }

    /// Get the configuration.
    pub const fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Get the bundle store.
    pub const fn bundles(&self) -> &Arc<dyn BundleStore> {
        &self.bundles
    }
}

fn converged_condition(report: &ConvergenceReport, clusters: &[ClusterId]) -> Condition {
    if report.is_complete() {
        Condition::new(
            CONDITION_WORKLOAD_CONVERGED,
            true,
            "Applied",
            format!("work applied to {} clusters", clusters.len()),
        )
    } else {
        Condition::new(
            CONDITION_WORKLOAD_CONVERGED,
            false,
            "ApplyFailed",
            format!(
                "failed on {}",
                report.failed.iter().map(|f| f.cluster.as_str()).join(", ")
            ),
        )
    }
}

/// Builder for Reconciler.
pub struct ReconcilerBuilder {
    bundles: Option<Arc<dyn BundleStore>>,
    decisions: Option<Arc<dyn PlacementDecisionLister>>,
    works: Option<Arc<dyn WorkStore>>,
    config: ReconcilerConfig,
}

impl ReconcilerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            bundles: None,
            decisions: None,
            works: None,
            config: ReconcilerConfig::default(),
        }
    }

    /// Set the bundle store.
    #[must_use]
    pub fn with_bundles(mut self, bundles: Arc<dyn BundleStore>) -> Self {
        self.bundles = Some(bundles);
        self
    }

    /// Set the placement decision index.
    #[must_use]
    pub fn with_decisions(mut self, decisions: Arc<dyn PlacementDecisionLister>) -> Self {
        self.decisions = Some(decisions);
        self
    }

    /// Set the work store.
    #[must_use]
    pub fn with_works(mut self, works: Arc<dyn WorkStore>) -> Self {
        self.works = Some(works);
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the reconciler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when a store is missing or the
    /// configuration does not validate.
    pub fn build(self) -> Result<Reconciler> {
        let bundles = self
            .bundles
            .ok_or_else(|| Error::invalid_config("bundle store is required"))?;
        let decisions = self
            .decisions
            .ok_or_else(|| Error::invalid_config("placement decision index is required"))?;
        let works = self
            .works
            .ok_or_else(|| Error::invalid_config("work store is required"))?;
        self.config.validate()?;

        Ok(Reconciler::new(bundles, decisions, works, self.config))
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
