//! The desired-state bundle and its status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::PLACEMENT_LABEL;
use crate::error::{Error, Result};
use crate::meta::{ObjectKey, ObjectMeta};

/// A single raw workload manifest, carried verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest(pub serde_json::Value);

impl Manifest {
    /// Wrap a raw manifest document.
    pub const fn new(raw: serde_json::Value) -> Self {
        Self(raw)
    }

    /// Borrow the raw document.
    pub const fn raw(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Ordered manifests making up the payload to replicate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    #[serde(default)]
    pub manifests: Vec<Manifest>,
}

impl Workload {
    /// Whether the workload carries no manifests.
    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }
}

/// Desired state of a bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleSpec {
    #[serde(default)]
    pub workload: Workload,
}

/// Tri-state condition status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

/// Observed condition reported on a bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    #[serde(default)]
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a condition stamped with the current time.
    pub fn new(
        type_: impl Into<String>,
        status: impl Into<ConditionStatus>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status: status.into(),
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    /// Equality ignoring the transition time.
    pub fn same_as(&self, other: &Self) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Observed state of a bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl BundleStatus {
    /// Look up a condition by type.
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Insert or replace a condition; returns `true` if anything changed.
    ///
    /// The transition time is kept when the status itself did not flip.
    pub fn set_condition(&mut self, mut condition: Condition) -> bool {
        match self
            .conditions
            .iter_mut()
            .find(|c| c.type_ == condition.type_)
        {
            Some(existing) if existing.same_as(&condition) => false,
            Some(existing) => {
                if existing.status == condition.status {
                    condition.last_transition_time = existing.last_transition_time;
                }
                *existing = condition;
                true
            }
            None => {
                self.conditions.push(condition);
                true
            }
        }
    }
}

/// Desired-state object describing a workload and where it should run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: BundleSpec,
    #[serde(default)]
    pub status: BundleStatus,
}

impl Bundle {
    /// Create an empty bundle.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            ..Self::default()
        }
    }

    /// Append a manifest to the workload.
    #[must_use]
    pub fn with_manifest(mut self, raw: serde_json::Value) -> Self {
        self.spec.workload.manifests.push(Manifest::new(raw));
        self
    }

    /// Point the bundle at a placement.
    #[must_use]
    pub fn with_placement(mut self, placement: impl Into<String>) -> Self {
        self.metadata
            .labels
            .insert(PLACEMENT_LABEL.to_string(), placement.into());
        self
    }

    /// Set a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata = self.metadata.with_label(key, value);
        self
    }

    /// Set an annotation.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata = self.metadata.with_annotation(key, value);
        self
    }

    /// The namespaced key of this bundle.
    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    /// Name of the placement this bundle is distributed by, if any.
    pub fn placement_ref(&self) -> Option<&str> {
        self.metadata.label(PLACEMENT_LABEL)
    }

    /// Check the fields a store requires before accepting the bundle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidObject`] when the name or namespace is empty.
    pub fn validate(&self) -> Result<()> {
        if self.metadata.name.is_empty() {
            return Err(Error::invalid_object(self.key().to_string(), "name is empty"));
        }
        if self.metadata.namespace.is_empty() {
            return Err(Error::invalid_object(
                self.key().to_string(),
                "namespace is empty",
            ));
        }
        Ok(())
    }
}
