//! Read-only placement decision index.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use kealm_core::{LabelSelector, ObjectKey, PlacementDecision};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::fault::{FaultInjector, Operation};

/// Queryable index of placement decisions, populated by an external scheduler.
#[async_trait]
pub trait PlacementDecisionLister: Send + Sync {
    /// List decisions in `namespace` whose labels match `selector`.
    ///
    /// Results come back in the store's iteration order.
    async fn list(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<PlacementDecision>>;
}

/// In-memory decision index, iterated in key order.
#[derive(Default)]
pub struct InMemoryPlacementDecisions {
    decisions: RwLock<BTreeMap<ObjectKey, PlacementDecision>>,
    faults: FaultInjector,
}

impl InMemoryPlacementDecisions {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty index wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Failure injection for this index.
    pub const fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// Insert or replace a decision, as the scheduler would.
    pub async fn upsert(&self, decision: PlacementDecision) {
        self.decisions
            .write()
            .await
            .insert(decision.metadata.key(), decision);
    }

    /// Remove a decision.
    pub async fn remove(&self, key: &ObjectKey) -> Option<PlacementDecision> {
        self.decisions.write().await.remove(key)
    }
}

#[async_trait]
impl PlacementDecisionLister for InMemoryPlacementDecisions {
    async fn list(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<PlacementDecision>> {
        self.faults.check(Operation::List, namespace).await?;
        Ok(self
            .decisions
            .read()
            .await
            .values()
            .filter(|d| d.metadata.namespace == namespace)
            .filter(|d| selector.matches(&d.metadata.labels))
            .cloned()
            .collect())
    }
}
