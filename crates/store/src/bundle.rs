//! Bundle store trait and in-memory implementation.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use kealm_core::{Bundle, ObjectKey, ResourceVersion, Uid};
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, trace};

use crate::error::{Result, StoreError};
use crate::fault::{FaultInjector, Operation};
use crate::watch::{WatchEvent, WatchEventKind};

const KIND: &str = "Bundle";
const WATCH_CAPACITY: usize = 1024;

/// Storage for desired-state bundles.
///
/// `update` persists metadata and spec; status is only written through
/// `update_status`. Deleting a bundle that still carries finalizers only marks
/// it for deletion; it is removed by the update that clears its last finalizer.
#[async_trait]
pub trait BundleStore: Send + Sync {
    /// Read a bundle.
    async fn get(&self, key: &ObjectKey) -> Result<Bundle>;

    /// List every bundle.
    async fn list(&self) -> Result<Vec<Bundle>>;

    /// Create a bundle, assigning its UID and resource version.
    async fn create(&self, bundle: Bundle) -> Result<Bundle>;

    /// Persist metadata and spec, guarded by the bundle's resource version.
    async fn update(&self, bundle: &Bundle) -> Result<Bundle>;

    /// Persist status only, guarded by the bundle's resource version.
    async fn update_status(&self, bundle: &Bundle) -> Result<Bundle>;

    /// Request deletion of a bundle.
    async fn delete(&self, key: &ObjectKey) -> Result<()>;

    /// Subscribe to change notifications.
    fn watch(&self) -> broadcast::Receiver<WatchEvent>;
}

#[derive(Default)]
struct State {
    bundles: BTreeMap<ObjectKey, Bundle>,
    last_version: ResourceVersion,
}

impl State {
    fn next_version(&mut self) -> ResourceVersion {
        self.last_version = self.last_version.saturating_add(1);
        self.last_version
    }
}

/// In-memory bundle store with optimistic concurrency and watch support.
pub struct InMemoryBundleStore {
    state: RwLock<State>,
    events: broadcast::Sender<WatchEvent>,
    faults: FaultInjector,
}

impl Default for InMemoryBundleStore {
    fn default() -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            state: RwLock::new(State::default()),
            events,
            faults: FaultInjector::new(),
        }
    }
}

impl InMemoryBundleStore {
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

    fn notify(&self, kind: WatchEventKind, key: ObjectKey) {
        trace!(bundle = %key, kind = ?kind, "Publishing bundle change");
        // No receivers is fine: nobody is watching yet.
        let _ = self.events.send(WatchEvent::new(kind, key));
    }
}

fn check_version(
    key: &ObjectKey,
    expected: ResourceVersion,
    actual: ResourceVersion,
) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(StoreError::conflict(KIND, key, expected, actual))
    }
}

#[async_trait]
impl BundleStore for InMemoryBundleStore {
    async fn get(&self, key: &ObjectKey) -> Result<Bundle> {
        self.faults.check(Operation::Get, &key.namespace).await?;
        self.state
            .read()
            .await
            .bundles
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::not_found(KIND, key))
    }

    async fn list(&self) -> Result<Vec<Bundle>> {
        self.faults.check(Operation::List, "").await?;
        Ok(self.state.read().await.bundles.values().cloned().collect())
    }

    async fn create(&self, mut bundle: Bundle) -> Result<Bundle> {
        let key = bundle.key();
        self.faults.check(Operation::Create, &key.namespace).await?;
        bundle
            .validate()
            .map_err(|e| StoreError::invalid(KIND, e.to_string()))?;

        let mut state = self.state.write().await;
        if state.bundles.contains_key(&key) {
            return Err(StoreError::already_exists(KIND, &key));
        }

        if bundle.metadata.uid.is_empty() {
            bundle.metadata.uid = Uid::generate();
        }
        bundle.metadata.creation_timestamp = Some(Utc::now());
        bundle.metadata.deletion_timestamp = None;
        bundle.metadata.resource_version = state.next_version();
        state.bundles.insert(key.clone(), bundle.clone());
        drop(state);

        debug!(bundle = %key, uid = %bundle.metadata.uid, "Created bundle");
        self.notify(WatchEventKind::Added, key);
        Ok(bundle)
    }

    async fn update(&self, bundle: &Bundle) -> Result<Bundle> {
        let key = bundle.key();
        self.faults.check(Operation::Update, &key.namespace).await?;

        let mut state = self.state.write().await;
        let current = state
            .bundles
            .get(&key)
            .ok_or_else(|| StoreError::not_found(KIND, &key))?;
        check_version(
            &key,
            bundle.metadata.resource_version,
            current.metadata.resource_version,
        )?;

        let mut next = bundle.clone();
        next.metadata.uid = current.metadata.uid.clone();
        next.metadata.creation_timestamp = current.metadata.creation_timestamp;
        next.metadata.deletion_timestamp = current.metadata.deletion_timestamp;
        next.status = current.status.clone();

        if next.metadata.is_deleting() && next.metadata.finalizers.is_empty() {
            state.bundles.remove(&key);
            drop(state);
            debug!(bundle = %key, "Last finalizer removed, bundle erased");
            self.notify(WatchEventKind::Deleted, key);
            return Ok(next);
        }

        next.metadata.resource_version = state.next_version();
        state.bundles.insert(key.clone(), next.clone());
        drop(state);

        self.notify(WatchEventKind::Modified, key);
        Ok(next)
    }

    async fn update_status(&self, bundle: &Bundle) -> Result<Bundle> {
        let key = bundle.key();
        self.faults
            .check(Operation::UpdateStatus, &key.namespace)
            .await?;

        let mut state = self.state.write().await;
        let version = state.next_version();
        let current = state
            .bundles
            .get_mut(&key)
            .ok_or_else(|| StoreError::not_found(KIND, &key))?;
        check_version(
            &key,
            bundle.metadata.resource_version,
            current.metadata.resource_version,
        )?;

        current.status = bundle.status.clone();
        current.metadata.resource_version = version;
        let updated = current.clone();
        drop(state);

        self.notify(WatchEventKind::Modified, key);
        Ok(updated)
    }

    async fn delete(&self, key: &ObjectKey) -> Result<()> {
        self.faults.check(Operation::Delete, &key.namespace).await?;

        let mut state = self.state.write().await;
        let version = state.next_version();
        let current = state
            .bundles
            .get_mut(key)
            .ok_or_else(|| StoreError::not_found(KIND, key))?;

        if current.metadata.finalizers.is_empty() {
            state.bundles.remove(key);
            drop(state);
            debug!(bundle = %key, "Bundle erased");
            self.notify(WatchEventKind::Deleted, key.clone());
            return Ok(());
        }

        if current.metadata.deletion_timestamp.is_none() {
            current.metadata.deletion_timestamp = Some(Utc::now());
            current.metadata.resource_version = version;
        }
        drop(state);

        debug!(bundle = %key, "Bundle marked for deletion");
        self.notify(WatchEventKind::Modified, key.clone());
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }
}
