//! Keyed work queue feeding the reconciliation workers.
//!
//! A key is held at most once in the queue and is handed to at most one
//! worker at a time. A key added while a worker holds it is marked dirty and
//! queued again when that worker calls [`WorkQueue::done`], so no change
//! notification is lost and no bundle is reconciled concurrently with itself.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use kealm_core::ObjectKey;
use tokio::sync::{Mutex, Notify};
use tracing::trace;

#[derive(Default)]
struct QueueState {
    queue: VecDeque<ObjectKey>,
    queued: HashSet<ObjectKey>,
    processing: HashSet<ObjectKey>,
    dirty: HashSet<ObjectKey>,
    failures: HashMap<ObjectKey, u32>,
    shutting_down: bool,
}

impl QueueState {
    fn enqueue(&mut self, key: ObjectKey) -> bool {
        if self.processing.contains(&key) {
            self.dirty.insert(key);
            return false;
        }
        if self.queued.insert(key.clone()) {
            self.queue.push_back(key);
            return true;
        }
        false
    }
}

/// Deduplicating queue of bundle keys.
#[derive(Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl WorkQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty queue wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Queue a key. Ignored after shutdown.
    pub async fn add(&self, key: ObjectKey) {
        let mut state = self.state.lock().await;
        if state.shutting_down {
            return;
        }
        trace!(bundle = %key, "Queueing bundle");
        if state.enqueue(key) {
            self.notify.notify_one();
        }
    }

    /// Queue a key once `delay` has elapsed.
    pub fn add_after(self: &Arc<Self>, key: ObjectKey, delay: Duration) {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key).await;
        });
    }

    /// Wait for the next key.
    ///
    /// Returns `None` once the queue is shut down.
    pub async fn get(&self) -> Option<ObjectKey> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.queued.remove(&key);
                    state.processing.insert(key.clone());
                    if !state.queue.is_empty() {
                        self.notify.notify_one();
                    }
                    return Some(key);
                }
            }

            notified.await;
        }
    }

    /// Release a key handed out by [`WorkQueue::get`].
    pub async fn done(&self, key: &ObjectKey) {
        let mut state = self.state.lock().await;
        state.processing.remove(key);
        if state.dirty.remove(key) && !state.shutting_down && state.enqueue(key.clone()) {
            self.notify.notify_one();
        }
    }

    /// Record a failed reconciliation; returns the consecutive failure count.
    pub async fn record_failure(&self, key: &ObjectKey) -> u32 {
        let mut state = self.state.lock().await;
        let count = state.failures.entry(key.clone()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Reset the failure count of a key.
    pub async fn forget(&self, key: &ObjectKey) {
        self.state.lock().await.failures.remove(key);
    }

    /// Stop handing out keys and wake every waiting worker.
    pub async fn shutdown(&self) {
        self.state.lock().await.shutting_down = true;
        self.notify.notify_waiters();
    }

    /// Number of keys waiting.
    pub async fn len(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    /// Whether no key is waiting.
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.queue.is_empty()
    }
}
