//! Per-cluster replica of a bundle's workload.

use serde::{Deserialize, Serialize};

use crate::bundle::Workload;
use crate::constants::OWNED_BY_LABEL;
use crate::meta::{ObjectKey, ObjectMeta, Uid};

/// Payload delivered to the cluster agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestWork {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ManifestWorkSpec,
}

/// Desired content of a manifest work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestWorkSpec {
    #[serde(default)]
    pub workload: Workload,
}

impl ManifestWork {
    /// The namespaced key of this work; the namespace is the target cluster.
    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    /// UID of the bundle owning this work, read from [`OWNED_BY_LABEL`].
    pub fn owner(&self) -> Option<Uid> {
        self.metadata.label(OWNED_BY_LABEL).map(Uid::new)
    }

    /// Whether this work belongs to the bundle with the given UID.
    pub fn is_owned_by(&self, uid: &Uid) -> bool {
        self.metadata.label(OWNED_BY_LABEL) == Some(uid.as_str())
    }
}
