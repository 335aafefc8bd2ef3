//! Manifest work store trait and implementations.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use kealm_core::{
    ClusterId, LabelSelector, ManifestWork, OWNED_BY_LABEL, ObjectKey, ResourceVersion, Uid,
};
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::fault::{FaultInjector, Operation};

const KIND: &str = "ManifestWork";

/// Per-cluster work distribution store. Works are namespaced by cluster.
#[async_trait]
pub trait WorkStore: Send + Sync {
    /// Read the work `name` on `cluster`.
    async fn get(&self, cluster: &ClusterId, name: &str) -> Result<ManifestWork>;

    /// Create a work; fails with `AlreadyExists` if the name is taken.
    async fn create(&self, work: &ManifestWork) -> Result<ManifestWork>;

    /// Replace a work, guarded by its resource version.
    async fn update(&self, work: &ManifestWork) -> Result<ManifestWork>;

    /// Delete the work `name` on `cluster`.
    async fn delete(&self, cluster: &ClusterId, name: &str) -> Result<()>;

    /// List works matching `selector`, on one cluster or on all of them.
    async fn list(
        &self,
        cluster: Option<&ClusterId>,
        selector: &LabelSelector,
    ) -> Result<Vec<ManifestWork>>;
}

#[derive(Default)]
struct State {
    works: BTreeMap<ObjectKey, ManifestWork>,
    by_owner: HashMap<Uid, BTreeSet<ObjectKey>>,
    last_version: ResourceVersion,
}

impl State {
    fn next_version(&mut self) -> ResourceVersion {
        self.last_version = self.last_version.saturating_add(1);
        self.last_version
    }

    fn index(&mut self, work: &ManifestWork) {
        if let Some(owner) = work.owner() {
            self.by_owner.entry(owner).or_default().insert(work.key());
        }
    }

    fn unindex(&mut self, work: &ManifestWork) {
        let Some(owner) = work.owner() else {
            return;
        };
        if let Some(keys) = self.by_owner.get_mut(&owner) {
            keys.remove(&work.key());
            if keys.is_empty() {
                self.by_owner.remove(&owner);
            }
        }
    }

    fn candidates(&self, selector: &LabelSelector) -> Vec<&ManifestWork> {
        match selector.required_value(OWNED_BY_LABEL) {
            Some(owner) => self
                .by_owner
                .get(&Uid::new(owner))
                .map(|keys| keys.iter().filter_map(|k| self.works.get(k)).collect())
                .unwrap_or_default(),
            None => self.works.values().collect(),
        }
    }
}

/// In-memory work store with an owner-label index.
#[derive(Default)]
pub struct InMemoryWorkStore {
    state: RwLock<State>,
    faults: FaultInjector,
}

impl InMemoryWorkStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Failure injection for this store.
    pub const fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// Number of stored works.
    pub async fn len(&self) -> usize {
        self.state.read().await.works.len()
    }

    /// Whether the store holds no works.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.works.is_empty()
    }
}

#[async_trait]
impl WorkStore for InMemoryWorkStore {
    async fn get(&self, cluster: &ClusterId, name: &str) -> Result<ManifestWork> {
        self.faults.check(Operation::Get, cluster.as_str()).await?;
        let key = ObjectKey::new(cluster.as_str(), name);
        self.state
            .read()
            .await
            .works
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::not_found(KIND, &key))
    }

    async fn create(&self, work: &ManifestWork) -> Result<ManifestWork> {
        let key = work.key();
        self.faults.check(Operation::Create, &key.namespace).await?;
        if key.name.is_empty() || key.namespace.is_empty() {
            return Err(StoreError::invalid(KIND, format!("incomplete key '{key}'")));
        }

        let mut state = self.state.write().await;
        if state.works.contains_key(&key) {
            return Err(StoreError::already_exists(KIND, &key));
        }

        let mut created = work.clone();
        created.metadata.uid = Uid::generate();
        created.metadata.creation_timestamp = Some(Utc::now());
        created.metadata.resource_version = state.next_version();
        state.index(&created);
        state.works.insert(key, created.clone());
        Ok(created)
    }

    async fn update(&self, work: &ManifestWork) -> Result<ManifestWork> {
        let key = work.key();
        self.faults.check(Operation::Update, &key.namespace).await?;

        let mut state = self.state.write().await;
        let Some(current) = state.works.get(&key).cloned() else {
            return Err(StoreError::not_found(KIND, &key));
        };
        if work.metadata.resource_version != current.metadata.resource_version {
            return Err(StoreError::conflict(
                KIND,
                &key,
                work.metadata.resource_version,
                current.metadata.resource_version,
            ));
        }

        let mut next = work.clone();
        next.metadata.uid = current.metadata.uid.clone();
        next.metadata.creation_timestamp = current.metadata.creation_timestamp;
        next.metadata.resource_version = state.next_version();
        state.unindex(&current);
        state.index(&next);
        state.works.insert(key, next.clone());
        Ok(next)
    }

    async fn delete(&self, cluster: &ClusterId, name: &str) -> Result<()> {
        self.faults.check(Operation::Delete, cluster.as_str()).await?;
        let key = ObjectKey::new(cluster.as_str(), name);

        let mut state = self.state.write().await;
        let removed = state
            .works
            .remove(&key)
            .ok_or_else(|| StoreError::not_found(KIND, &key))?;
        state.unindex(&removed);
        Ok(())
    }

    async fn list(
        &self,
        cluster: Option<&ClusterId>,
        selector: &LabelSelector,
    ) -> Result<Vec<ManifestWork>> {
        self.faults
            .check(Operation::List, cluster.map_or("", ClusterId::as_str))
            .await?;

        let state = self.state.read().await;
        Ok(state
            .candidates(selector)
            .into_iter()
            .filter(|w| cluster.is_none_or(|c| w.metadata.namespace == c.as_str()))
            .filter(|w| selector.matches(&w.metadata.labels))
            .cloned()
            .collect())
    }
}

/// A wrapper that adds tracing to a work store.
pub struct TracingWorkStore<S: WorkStore> {
    inner: S,
}

impl<S: WorkStore> TracingWorkStore<S> {
    /// Create a new tracing work store.
    pub const fn new(inner: S) -> Self {
        Self { inner }
    }

    /// The wrapped store.
    pub const fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: WorkStore> WorkStore for TracingWorkStore<S> {
    async fn get(&self, cluster: &ClusterId, name: &str) -> Result<ManifestWork> {
        tracing::debug!(cluster = %cluster, name, "Reading manifest work");
        self.inner.get(cluster, name).await
    }

    async fn create(&self, work: &ManifestWork) -> Result<ManifestWork> {
        tracing::debug!(work = %work.key(), "Creating manifest work");
        let result = self.inner.create(work).await;
        if let Ok(ref created) = result {
            tracing::trace!(
                work = %created.key(),
                version = created.metadata.resource_version,
                "Manifest work created"
            );
        }
        result
    }

    async fn update(&self, work: &ManifestWork) -> Result<ManifestWork> {
        tracing::debug!(
            work = %work.key(),
            version = work.metadata.resource_version,
            "Updating manifest work"
        );
        self.inner.update(work).await
    }

    async fn delete(&self, cluster: &ClusterId, name: &str) -> Result<()> {
        tracing::debug!(cluster = %cluster, name, "Deleting manifest work");
        self.inner.delete(cluster, name).await
    }

    async fn list(
        &self,
        cluster: Option<&ClusterId>,
        selector: &LabelSelector,
    ) -> Result<Vec<ManifestWork>> {
        tracing::debug!(cluster = ?cluster, selector = %selector, "Listing manifest works");
        self.inner.list(cluster, selector).await
    }
}
