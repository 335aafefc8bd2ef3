//! Seed state for the in-memory stores.

use std::path::Path;

use anyhow::{Context, Result, bail};
use kealm_core::{Bundle, PlacementDecision};
use kealm_store::{BundleStore, InMemoryBundleStore, InMemoryPlacementDecisions};
use serde::Deserialize;
use tracing::info;

/// Bundles and placement decisions loaded at startup.
///
/// ```yaml
/// bundles:
///   - metadata:
///       name: b1
///       namespace: apps
///       labels:
///         cluster.open-cluster-management.io/placement: p1
///     spec:
///       workload:
///         manifests:
///           - {apiVersion: v1, kind: ConfigMap, metadata: {name: cm1}}
/// decisions:
///   - metadata:
///       name: p1-decision
///       namespace: apps
///       labels:
///         cluster.open-cluster-management.io/placement: p1
///     status:
///       decisions:
///         - clusterName: east
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct SeedState {
    #[serde(default)]
    pub bundles: Vec<Bundle>,
    #[serde(default)]
    pub decisions: Vec<PlacementDecision>,
}

impl SeedState {
    /// Parse a seed file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse state file {}", path.display()))
    }

    /// Load the seed into the stores.
    pub async fn apply(
        self,
        bundles: &InMemoryBundleStore,
        decisions: &InMemoryPlacementDecisions,
    ) -> Result<()> {
        let (bundle_count, decision_count) = (self.bundles.len(), self.decisions.len());

        for decision in self.decisions {
            if decision.placement_name().is_none() {
                bail!(
                    "Decision {} has no placement label and can never be matched",
                    decision.metadata.key()
                );
            }
            decisions.upsert(decision).await;
        }
        for bundle in self.bundles {
            let key = bundle.key();
            bundles
                .create(bundle)
                .await
                .with_context(|| format!("Failed to seed bundle {key}"))?;
        }

        info!(
            bundles = bundle_count,
            decisions = decision_count,
            "Seeded stores"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use kealm_core::{LabelSelector, ObjectKey, PLACEMENT_LABEL};
    use kealm_store::PlacementDecisionLister;
    use std::io::Write;

    const STATE: &str = r"
bundles:
  - metadata:
      name: b1
      namespace: apps
      labels:
        cluster.open-cluster-management.io/placement: p1
    spec:
      workload:
        manifests:
          - {apiVersion: v1, kind: ConfigMap, metadata: {name: cm1}}
decisions:
  - metadata:
      name: p1-decision
      namespace: apps
      labels:
        cluster.open-cluster-management.io/placement: p1
    status:
      decisions:
        - clusterName: east
        - clusterName: west
";

    #[tokio::test]
    async fn test_seed_file_populates_stores() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(STATE.as_bytes()).unwrap();

        let seed = SeedState::from_file(file.path()).unwrap();
        let bundles = InMemoryBundleStore::new();
        let decisions = InMemoryPlacementDecisions::new();
        seed.apply(&bundles, &decisions).await.unwrap();

        let bundle = bundles.get(&ObjectKey::new("apps", "b1")).await.unwrap();
        assert_eq!(bundle.placement_ref(), Some("p1"));
        assert_eq!(bundle.spec.workload.manifests.len(), 1);
        assert!(!bundle.metadata.uid.is_empty());

        let selector = LabelSelector::everything().with_equals(PLACEMENT_LABEL, "p1");
        let found = decisions.list("apps", &selector).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].clusters().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_bundle_fails_seeding() {
        let seed: SeedState = serde_yaml::from_str(
            "bundles:\n  - metadata: {name: b1, namespace: apps}\n  - metadata: {name: b1, namespace: apps}\n",
        )
        .unwrap();
        let result = seed
            .apply(
                &InMemoryBundleStore::new(),
                &InMemoryPlacementDecisions::new(),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unlabeled_decision_fails_seeding() {
        let seed: SeedState = serde_yaml::from_str(
            "decisions:\n  - metadata: {name: d1, namespace: apps}\n    status:\n      decisions:\n        - clusterName: east\n",
        )
        .unwrap();
        let decisions = InMemoryPlacementDecisions::new();
        let result = seed.apply(&InMemoryBundleStore::new(), &decisions).await;

        assert!(result.is_err_and(|e| e.to_string().contains("apps/d1")));
        let found = decisions
            .list("apps", &LabelSelector::everything())
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(SeedState::from_file(Path::new("/nonexistent/state.yaml")).is_err());
    }
}
