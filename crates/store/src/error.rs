//! Store error taxonomy.

use kealm_core::ResourceVersion;
use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors returned by store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} '{key}' not found")]
    NotFound { kind: String, key: String },

    #[error("{kind} '{key}' already exists")]
    AlreadyExists { kind: String, key: String },

    #[error("{kind} '{key}' was modified: expected version {expected}, found {actual}")]
    Conflict {
        kind: String,
        key: String,
        expected: ResourceVersion,
        actual: ResourceVersion,
    },

    #[error("store operation '{operation}' failed: {reason}")]
    Transport { operation: String, reason: String },

    #[error("invalid {kind}: {reason}")]
    Invalid { kind: String, reason: String },
}

impl StoreError {
    /// Create a not found error.
    pub fn not_found(kind: impl Into<String>, key: impl ToString) -> Self {
        Self::NotFound {
            kind: kind.into(),
            key: key.to_string(),
        }
    }

    /// Create an already exists error.
    pub fn already_exists(kind: impl Into<String>, key: impl ToString) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            key: key.to_string(),
        }
    }

    /// Create a stale version conflict.
    pub fn conflict(
        kind: impl Into<String>,
        key: impl ToString,
        expected: ResourceVersion,
        actual: ResourceVersion,
    ) -> Self {
        Self::Conflict {
            kind: kind.into(),
            key: key.to_string(),
            expected,
            actual,
        }
    }

    /// Create a transport error.
    pub fn transport(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid object error.
    pub fn invalid(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    /// Whether the object did not exist.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether the write lost an optimistic-concurrency race.
    ///
    /// A create that finds the name taken counts as a lost race too.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::AlreadyExists { .. })
    }
}
