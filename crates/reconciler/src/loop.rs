//! Continuous reconciliation loop.

use std::sync::Arc;
use std::time::Duration;

use kealm_core::ObjectKey;
use kealm_store::BundleStore;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Instant, interval_at};
use tracing::{debug, error, info, warn};

use crate::config::ReconcilerConfig;
use crate::error::{Error, Result};
use crate::queue::WorkQueue;
use crate::reconciler::Reconciler;
use crate::types::ReconcileOutcome;

/// Summary of a single pass over every bundle.
#[derive(Debug, Default)]
pub struct PassSummary {
    /// Bundles reconciled without error.
    pub reconciled: usize,
    /// Bundles whose reconciliation failed.
    pub failed: Vec<(ObjectKey, Error)>,
}

impl PassSummary {
    /// Whether every bundle reconciled.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Continuous reconciliation loop.
///
/// Watches the bundle store, queues every changed key, and hands keys to a
/// fixed pool of workers. Every bundle is also queued on a periodic resync.
/// Failed reconciliations are queued again with exponential backoff.
pub struct ReconciliationLoop {
    /// The reconciler.
    reconciler: Arc<Reconciler>,
    /// Pending bundle keys.
    queue: Arc<WorkQueue>,
    /// Loop configuration.
    config: ReconcilerConfig,
    /// Stop signal receiver.
    stop_rx: watch::Receiver<bool>,
    /// Stop signal sender (for external control).
    stop_tx: watch::Sender<bool>,
}

impl ReconciliationLoop {
    /// Create a new reconciliation loop using the reconciler's configuration.
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        let config = reconciler.config().clone();
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            reconciler,
            queue: WorkQueue::new_arc(),
            config,
            stop_rx,
            stop_tx,
        }
    }

    /// Run until stopped or the bundle watch closes.
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok`; reconciliation failures are requeued,
    /// not returned.
    pub async fn run(&self) -> Result<()> {
        let mut stop_rx = self.stop_rx.clone();
        if *stop_rx.borrow_and_update() {
            return Ok(());
        }

        info!(
            workers = self.config.workers,
            resync_ms = u64::try_from(self.config.resync_period.as_millis()).unwrap_or(u64::MAX),
            "Starting reconciliation loop"
        );

        let bundles = Arc::clone(self.reconciler.bundles());
        let mut events = bundles.watch();
        self.resync(bundles.as_ref()).await;

        let mut workers = JoinSet::new();
        for id in 0..self.config.workers {
            let worker = Worker {
                id,
                reconciler: Arc::clone(&self.reconciler),
                queue: Arc::clone(&self.queue),
                config: self.config.clone(),
            };
            workers.spawn(worker.run());
        }

        let period = self.config.resync_period;
        let mut resync = interval_at(first_resync(Instant::now(), period), period);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => {
                        debug!(bundle = %event.key, kind = ?event.kind, "Bundle changed");
                        self.queue.add(event.key).await;
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Bundle watch lagged, resyncing");
                        self.resync(bundles.as_ref()).await;
                    }
                    Err(RecvError::Closed) => {
                        info!("Bundle watch closed");
                        break;
                    }
                },
                _ = resync.tick() => {
                    debug!("Periodic resync");
                    self.resync(bundles.as_ref()).await;
                }
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }

        self.queue.shutdown().await;
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Reconcile worker panicked");
            }
        }
        info!("Reconciliation loop stopped");
        Ok(())
    }

    /// Reconcile every bundle once, in key order.
    ///
    /// A bundle whose first step only registers the finalizer is reconciled a
    /// second time so the pass leaves it distributed.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundles cannot be listed; per-bundle failures
    /// are collected in the summary.
    pub async fn reconcile_once(&self) -> Result<PassSummary> {
        let keys: Vec<ObjectKey> = self
            .reconciler
            .bundles()
            .list()
            .await?
            .iter()
            .map(|b| b.key())
            .collect();

        let mut summary = PassSummary::default();
        for key in keys {
            let mut result =
                reconcile_with_deadline(&self.reconciler, &key, self.config.reconcile_timeout)
                    .await;
            if matches!(result, Ok(ReconcileOutcome::FinalizerAdded)) {
                result =
                    reconcile_with_deadline(&self.reconciler, &key, self.config.reconcile_timeout)
                        .await;
            }
            match result {
                Ok(_) => summary.reconciled = summary.reconciled.saturating_add(1),
                Err(e) => summary.failed.push((key, e)),
            }
        }
        Ok(summary)
    }

    async fn resync(&self, bundles: &dyn BundleStore) {
        match bundles.list().await {
            Ok(all) => {
                for bundle in all {
                    self.queue.add(bundle.key()).await;
                }
            }
            Err(e) => warn!(error = %e, "Failed to list bundles for resync"),
        }
    }

    /// Stop the loop.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Get a stopper handle.
    pub fn stopper(&self) -> LoopStopper {
        LoopStopper {
            stop_tx: self.stop_tx.clone(),
        }
    }
}

/// Handle to stop a reconciliation loop.
#[derive(Clone)]
pub struct LoopStopper {
    stop_tx: watch::Sender<bool>,
}

impl LoopStopper {
    /// Stop the loop.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

struct Worker {
    id: usize,
    reconciler: Arc<Reconciler>,
    queue: Arc<WorkQueue>,
    config: ReconcilerConfig,
}

impl Worker {
    async fn run(self) {
        debug!(worker = self.id, "Worker started");
        while let Some(key) = self.queue.get().await {
            self.process(&key).await;
            self.queue.done(&key).await;
        }
        debug!(worker = self.id, "Worker stopped");
    }

    async fn process(&self, key: &ObjectKey) {
        match reconcile_with_deadline(&self.reconciler, key, self.config.reconcile_timeout).await {
            Ok(outcome) => {
                debug!(worker = self.id, bundle = %key, outcome = ?outcome, "Reconciled");
                self.queue.forget(key).await;
            }
            Err(e) if e.is_retryable() => {
                let failures = self.queue.record_failure(key).await;
                let delay = self.config.requeue_delay(failures);
                warn!(
                    worker = self.id,
                    bundle = %key,
                    error = %e,
                    failures,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Reconciliation failed, requeueing"
                );
                self.queue.add_after(key.clone(), delay);
            }
            Err(e) => {
                error!(
                    worker = self.id,
                    bundle = %key,
                    error = %e,
                    "Reconciliation failed permanently"
                );
                self.queue.forget(key).await;
            }
        }
    }
}

/// One period after `now`, or `now` when that is past the clock's range.
fn first_resync(now: Instant, period: Duration) -> Instant {
    now.checked_add(period).unwrap_or(now)
}

/// Reconcile `key`, failing with [`Error::DeadlineExceeded`] after `limit`.
///
/// # Errors
///
/// Propagates the reconciler's error or the deadline error.
pub async fn reconcile_with_deadline(
    reconciler: &Reconciler,
    key: &ObjectKey,
    limit: Duration,
) -> Result<ReconcileOutcome> {
    tokio::time::timeout(limit, reconciler.reconcile(key))
        .await
        .unwrap_or_else(|_| Err(Error::deadline_exceeded(key.clone(), limit)))
}
