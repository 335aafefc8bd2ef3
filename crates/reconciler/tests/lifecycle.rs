//! Bundle lifecycle behavioral tests - BDD style
//!
//! Following BDD naming convention: given_<context>_when_<action>_then_<outcome>
//!
//! Each test drives the controller against the in-memory stores exactly as the
//! loop would: one `reconcile` call per delivered event.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::sync::Arc;

use kealm_core::{
    Bundle, ClusterId, DEPLOY_FINALIZER, LabelSelector, OWNED_BY_LABEL, ObjectKey,
    PlacementDecision, Uid,
};
use kealm_reconciler::{
    Error, ReconcileOutcome, Reconciler, ReconcilerBuilder, ReconcilerConfig, Result,
};
use kealm_store::{
    BundleStore, InMemoryBundleStore, InMemoryPlacementDecisions, InMemoryWorkStore, Operation,
    StoreError, WorkStore,
};
use serde_json::json;

struct Harness {
    bundles: Arc<InMemoryBundleStore>,
    decisions: Arc<InMemoryPlacementDecisions>,
    works: Arc<InMemoryWorkStore>,
    reconciler: Reconciler,
}

impl Harness {
    fn new() -> Result<Self> {
        let bundles = InMemoryBundleStore::new_arc();
        let decisions = InMemoryPlacementDecisions::new_arc();
        let works = InMemoryWorkStore::new_arc();
        let reconciler = ReconcilerBuilder::new()
            .with_bundles(bundles.clone())
            .with_decisions(decisions.clone())
            .with_works(works.clone())
            .with_config(ReconcilerConfig::default().max_concurrent_targets(2))
            .build()?;
        Ok(Self {
            bundles,
            decisions,
            works,
            reconciler,
        })
    }

    async fn place(&self, placement: &str, clusters: &[&str]) {
        self.decisions
            .upsert(PlacementDecision::new(
                "apps",
                &format!("{placement}-decision"),
                placement,
                clusters.iter().copied(),
            ))
            .await;
    }

    async fn submit(&self, name: &str, uid: &str, placement: &str) -> Result<ObjectKey> {
        let mut bundle = Bundle::new("apps", name)
            .with_placement(placement)
            .with_manifest(json!({"kind": "ConfigMap", "metadata": {"name": "cm1"}}));
        bundle.metadata.uid = Uid::new(uid);
        Ok(self.bundles.create(bundle).await?.key())
    }

    async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome> {
        self.reconciler.reconcile(key).await
    }

    async fn owned(&self, uid: &str) -> Result<Vec<ObjectKey>> {
        let selector = LabelSelector::everything().with_equals(OWNED_BY_LABEL, uid);
        Ok(self
            .works
            .list(None, &selector)
            .await?
            .iter()
            .map(|w| w.key())
            .collect())
    }
}

fn work_key(cluster: &str, name: &str) -> ObjectKey {
    ObjectKey::new(cluster, name)
}

// ============================================================================
// 1. DISTRIBUTION
// ============================================================================

#[tokio::test]
async fn given_resolved_placement_when_reconciled_then_one_work_per_cluster() -> Result<()> {
    // GIVEN: b1 (uid u1) placed by p1 onto east and west
    let h = Harness::new()?;
    h.place("p1", &["east", "west"]).await;
    let key = h.submit("b1", "u1", "p1").await?;

    // WHEN: the bundle is reconciled twice (finalizer, then distribution)
    assert_eq!(h.reconcile(&key).await?, ReconcileOutcome::FinalizerAdded);
    let outcome = h.reconcile(&key).await?;

    // THEN: east/b1 and west/b1 exist, owned by u1, carrying cm1
    assert!(matches!(outcome, ReconcileOutcome::Converged(ref r) if r.created() == 2));
    assert_eq!(
        h.owned("u1").await?,
        vec![work_key("east", "b1"), work_key("west", "b1")]
    );

    let bundle = h.bundles.get(&key).await?;
    for cluster in ["east", "west"] {
        let work = h.works.get(&ClusterId::new(cluster), "b1").await?;
        assert_eq!(work.owner(), Some(Uid::new("u1")));
        assert_eq!(work.spec.workload, bundle.spec.workload);
    }
    Ok(())
}

#[tokio::test]
async fn given_converged_bundle_when_reconciled_again_then_works_unchanged() -> Result<()> {
    let h = Harness::new()?;
    h.place("p1", &["east", "west"]).await;
    let key = h.submit("b1", "u1", "p1").await?;
    h.reconcile(&key).await?;
    h.reconcile(&key).await?;
    let east = h.works.get(&ClusterId::new("east"), "b1").await?;

    let outcome = h.reconcile(&key).await?;

    assert!(matches!(outcome, ReconcileOutcome::Converged(ref r) if r.updated() == 2));
    let again = h.works.get(&ClusterId::new("east"), "b1").await?;
    assert_eq!(again.spec, east.spec);
    assert_eq!(again.metadata.labels, east.metadata.labels);
    assert_eq!(again.metadata.uid, east.metadata.uid);
    assert_eq!(h.works.len().await, 2);
    Ok(())
}

#[tokio::test]
async fn given_empty_workload_when_reconciled_then_no_works_created() -> Result<()> {
    let h = Harness::new()?;
    h.place("p1", &["east", "west"]).await;
    let mut bundle = Bundle::new("apps", "b1").with_placement("p1");
    bundle.metadata.uid = Uid::new("u1");
    let key = h.bundles.create(bundle).await?.key();

    h.reconcile(&key).await?;
    let outcome = h.reconcile(&key).await?;

    assert_eq!(outcome, ReconcileOutcome::EmptyWorkload { clusters: 2 });
    assert!(h.works.is_empty().await);
    Ok(())
}

#[tokio::test]
async fn given_no_decision_when_reconciled_then_noop_until_decision_appears() -> Result<()> {
    let h = Harness::new()?;
    let key = h.submit("b1", "u1", "p1").await?;
    h.reconcile(&key).await?;

    let outcome = h.reconcile(&key).await?;
    assert!(matches!(outcome, ReconcileOutcome::PlacementUnresolved { .. }));
    assert!(h.works.is_empty().await);

    h.place("p1", &["east"]).await;
    let outcome = h.reconcile(&key).await?;
    assert!(matches!(outcome, ReconcileOutcome::Converged(_)));
    assert_eq!(h.owned("u1").await?, vec![work_key("east", "b1")]);
    Ok(())
}

#[tokio::test]
async fn given_failing_first_cluster_when_reconciled_then_later_clusters_still_converge()
-> Result<()> {
    let h = Harness::new()?;
    h.place("p1", &["east", "north", "west"]).await;
    let key = h.submit("b1", "u1", "p1").await?;
    h.reconcile(&key).await?;
    h.works
        .faults()
        .fail_times(
            Operation::Get,
            Some("east"),
            StoreError::transport("get", "connection reset"),
            1,
        )
        .await;

    let err = h.reconcile(&key).await.err();
    assert!(matches!(
        err,
        Some(Error::Convergence { attempted: 3, ref failures }) if failures.len() == 1
    ));
    assert_eq!(
        h.owned("u1").await?,
        vec![work_key("north", "b1"), work_key("west", "b1")]
    );

    // Redelivery heals the failed cluster.
    h.reconcile(&key).await?;
    assert_eq!(h.owned("u1").await?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn given_decision_withdrawn_when_reconciled_then_unresolved_and_works_kept() -> Result<()> {
    let h = Harness::new()?;
    h.place("p1", &["east"]).await;
    let key = h.submit("b1", "u1", "p1").await?;
    h.reconcile(&key).await?;
    h.reconcile(&key).await?;

    let withdrawn = h
        .decisions
        .remove(&ObjectKey::new("apps", "p1-decision"))
        .await;
    assert!(withdrawn.is_some());

    assert_eq!(
        h.reconcile(&key).await?,
        ReconcileOutcome::PlacementUnresolved {
            placement: "p1".into()
        }
    );
    assert_eq!(h.owned("u1").await?, vec![work_key("east", "b1")]);
    Ok(())
}

// ============================================================================
// 2. DELETION
// ============================================================================

#[tokio::test]
async fn given_distributed_bundle_when_deleted_then_works_removed_before_finalizer() -> Result<()>
{
    let h = Harness::new()?;
    h.place("p1", &["east", "west"]).await;
    let key = h.submit("b1", "u1", "p1").await?;
    h.reconcile(&key).await?;
    h.reconcile(&key).await?;

    h.bundles.delete(&key).await?;
    let pending = h.bundles.get(&key).await?;
    assert!(pending.metadata.is_deleting());
    assert!(pending.metadata.has_finalizer(DEPLOY_FINALIZER));

    let outcome = h.reconcile(&key).await?;

    assert_eq!(outcome, ReconcileOutcome::Released { deleted: 2 });
    assert!(h.owned("u1").await?.is_empty());
    assert!(h.bundles.get(&key).await.is_err_and(|e| e.is_not_found()));
    assert_eq!(h.reconcile(&key).await?, ReconcileOutcome::Gone);
    Ok(())
}

#[tokio::test]
async fn given_west_delete_fails_when_released_then_finalizer_kept_and_retry_succeeds()
-> Result<()> {
    let h = Harness::new()?;
    h.place("p1", &["east", "west"]).await;
    let key = h.submit("b1", "u1", "p1").await?;
    h.reconcile(&key).await?;
    h.reconcile(&key).await?;
    h.bundles.delete(&key).await?;
    h.works
        .faults()
        .fail_times(
            Operation::Delete,
            Some("west"),
            StoreError::transport("delete", "cluster unreachable"),
            1,
        )
        .await;

    // WHEN: the sweep fails on west
    let err = h.reconcile(&key).await.err();

    // THEN: the bundle keeps its finalizer and still owns the west work
    assert!(matches!(err, Some(Error::Sweep { ref work, .. }) if *work == work_key("west", "b1")));
    let held = h.bundles.get(&key).await?;
    assert!(held.metadata.has_finalizer(DEPLOY_FINALIZER));
    assert_eq!(h.owned("u1").await?, vec![work_key("west", "b1")]);

    // AND: redelivery finishes the release
    assert_eq!(
        h.reconcile(&key).await?,
        ReconcileOutcome::Released { deleted: 1 }
    );
    assert!(h.owned("u1").await?.is_empty());
    assert_eq!(h.reconcile(&key).await?, ReconcileOutcome::Gone);
    Ok(())
}

#[tokio::test]
async fn given_overlapping_bundles_when_one_deleted_then_other_works_survive() -> Result<()> {
    let h = Harness::new()?;
    h.place("p1", &["east", "west"]).await;
    h.place("p2", &["west", "north"]).await;
    let b1 = h.submit("b1", "u1", "p1").await?;
    let b2 = h.submit("b2", "u2", "p2").await?;
    for key in [&b1, &b2, &b1, &b2] {
        h.reconcile(key).await?;
    }
    assert_eq!(h.works.len().await, 4);

    h.bundles.delete(&b1).await?;
    h.reconcile(&b1).await?;

    assert!(h.owned("u1").await?.is_empty());
    assert_eq!(
        h.owned("u2").await?,
        vec![work_key("north", "b2"), work_key("west", "b2")]
    );
    Ok(())
}

#[tokio::test]
async fn given_bundle_never_distributed_when_deleted_then_released_with_nothing_swept()
-> Result<()> {
    let h = Harness::new()?;
    let key = h.submit("b1", "u1", "p1").await?;
    h.reconcile(&key).await?;
    h.bundles.delete(&key).await?;

    assert_eq!(
        h.reconcile(&key).await?,
        ReconcileOutcome::Released { deleted: 0 }
    );
    Ok(())
}

#[tokio::test]
async fn given_bundle_without_finalizer_when_deleted_then_removed_immediately() -> Result<()> {
    let h = Harness::new()?;
    let key = h.submit("b1", "u1", "p1").await?;

    h.bundles.delete(&key).await?;

    assert_eq!(h.reconcile(&key).await?, ReconcileOutcome::Gone);
    assert!(h.works.is_empty().await);
    Ok(())
}

#[tokio::test]
async fn given_foreign_finalizer_when_released_then_releasing_noop() -> Result<()> {
    // GIVEN: a distributed bundle that also carries another controller's finalizer
    let h = Harness::new()?;
    h.place("p1", &["east"]).await;
    let key = h.submit("b1", "u1", "p1").await?;
    h.reconcile(&key).await?;
    h.reconcile(&key).await?;
    let mut bundle = h.bundles.get(&key).await?;
    bundle.metadata.add_finalizer("example.com/keep");
    h.bundles.update(&bundle).await?;

    // WHEN: deletion is requested and our finalizer is released
    h.bundles.delete(&key).await?;
    assert_eq!(
        h.reconcile(&key).await?,
        ReconcileOutcome::Released { deleted: 1 }
    );

    // THEN: the bundle lingers on the foreign finalizer and further passes do nothing
    assert_eq!(h.reconcile(&key).await?, ReconcileOutcome::Releasing);
    let held = h.bundles.get(&key).await?;
    assert!(held.metadata.is_deleting());
    assert!(!held.metadata.has_finalizer(DEPLOY_FINALIZER));
    assert!(held.metadata.has_finalizer("example.com/keep"));
    assert!(h.owned("u1").await?.is_empty());
    Ok(())
}

// ============================================================================
// 3. FAILURE SURFACING
// ============================================================================

#[tokio::test]
async fn given_bundle_read_fails_when_reconciled_then_error_is_retryable() -> Result<()> {
    let h = Harness::new()?;
    let key = h.submit("b1", "u1", "p1").await?;
    h.bundles
        .faults()
        .fail_times(
            Operation::Get,
            None,
            StoreError::transport("get", "timeout"),
            1,
        )
        .await;

    let err = h.reconcile(&key).await.err();
    assert!(err.is_some_and(|e| e.is_retryable() && !e.is_conflict()));
    assert_eq!(h.reconcile(&key).await?, ReconcileOutcome::FinalizerAdded);
    Ok(())
}

#[tokio::test]
async fn given_decision_list_fails_when_reconciled_then_no_works_and_error() -> Result<()> {
    let h = Harness::new()?;
    h.place("p1", &["east"]).await;
    let key = h.submit("b1", "u1", "p1").await?;
    h.reconcile(&key).await?;
    h.decisions
        .faults()
        .fail_times(
            Operation::List,
            None,
            StoreError::transport("list", "timeout"),
            1,
        )
        .await;

    assert!(matches!(h.reconcile(&key).await, Err(Error::Store(_))));
    assert!(h.works.is_empty().await);
    Ok(())
}
