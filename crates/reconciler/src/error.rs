//! Error types for the reconciler crate.

use std::time::Duration;

use itertools::Itertools;
use kealm_core::{ObjectKey, Uid};
use kealm_store::StoreError;
use thiserror::Error;

use crate::types::TargetFailure;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
///
/// Every variant except the configuration ones is returned upward so the
/// bundle is reconciled again from scratch; nothing retries internally.
#[derive(Debug, Error)]
pub enum Error {
    /// A store call failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// No placement decision matches the bundle's placement.
    #[error("no placement decision for placement '{placement}' in namespace '{namespace}'")]
    PlacementNotResolved { placement: String, namespace: String },

    /// One or more target clusters could not be converged.
    #[error(
        "convergence failed on {} of {attempted} clusters: {}",
        .failures.len(),
        .failures.iter().map(|f| format!("{}: {}", f.cluster, f.error)).join("; ")
    )]
    Convergence {
        attempted: usize,
        failures: Vec<TargetFailure>,
    },

    /// Deleting an owned work failed; the finalizer stays in place.
    #[error("sweep of works owned by '{owner}' failed at '{work}': {source}")]
    Sweep {
        owner: Uid,
        work: ObjectKey,
        source: StoreError,
    },

    /// The reconciliation did not finish before its deadline.
    #[error("reconciliation of '{key}' exceeded its {timeout:?} deadline")]
    DeadlineExceeded { key: ObjectKey, timeout: Duration },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Configuration could not be loaded.
    #[error("failed to load configuration: {0}")]
    Config(#[from] kealm_core::Error),
}

impl Error {
    /// Create a placement not resolved error.
    pub fn placement_not_resolved(
        placement: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self::PlacementNotResolved {
            placement: placement.into(),
            namespace: namespace.into(),
        }
    }

    /// Create a convergence error.
    pub const fn convergence(attempted: usize, failures: Vec<TargetFailure>) -> Self {
        Self::Convergence {
            attempted,
            failures,
        }
    }

    /// Create a sweep error.
    pub fn sweep(owner: &Uid, work: ObjectKey, source: StoreError) -> Self {
        Self::Sweep {
            owner: owner.clone(),
            work,
            source,
        }
    }

    /// Create a deadline exceeded error.
    pub const fn deadline_exceeded(key: ObjectKey, timeout: Duration) -> Self {
        Self::DeadlineExceeded { key, timeout }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether redelivering the event may succeed.
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidConfig { .. } | Self::Config(_))
    }

    /// Whether the failure was an optimistic-concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Store(e) | Self::Sweep { source: e, .. } => e.is_conflict(),
            Self::Convergence { failures, .. } => {
                !failures.is_empty() && failures.iter().all(|f| f.error.is_conflict())
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kealm_core::ClusterId;

    #[test]
    fn test_convergence_display_lists_clusters() {
        let err = Error::convergence(
            3,
            vec![TargetFailure::new(
                ClusterId::new("west"),
                StoreError::transport("update", "unreachable"),
            )],
        );
        let msg = err.to_string();
        assert!(msg.contains("1 of 3"));
        assert!(msg.contains("west"));
        assert!(msg.contains("unreachable"));
    }

    #[test]
    fn test_conflict_classification() {
        let conflict = Error::from(StoreError::conflict("Bundle", "apps/web", 1, 2));
        assert!(conflict.is_conflict());
        assert!(conflict.is_retryable());

        let transport = Error::from(StoreError::transport("get", "reset"));
        assert!(!transport.is_conflict());

        let mixed = Error::convergence(
            2,
            vec![
                TargetFailure::new(
                    ClusterId::new("east"),
                    StoreError::already_exists("ManifestWork", "east/web"),
                ),
                TargetFailure::new(ClusterId::new("west"), StoreError::transport("get", "reset")),
            ],
        );
        assert!(!mixed.is_conflict());
    }

    #[test]
    fn test_config_errors_not_retryable() {
        assert!(!Error::invalid_config("workers must be positive").is_retryable());
        assert!(
            Error::deadline_exceeded(ObjectKey::new("apps", "web"), Duration::from_secs(1))
                .is_retryable()
        );
    }
}
