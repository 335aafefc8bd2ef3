//! Change notifications delivered by the bundle store.

use kealm_core::ObjectKey;
use serde::{Deserialize, Serialize};

/// Kind of change observed on a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchEventKind {
    Added,
    Modified,
    Deleted,
}

/// A change notification naming the affected bundle.
///
/// Only the key is delivered; consumers re-read the object, so stale or
/// duplicate notifications are harmless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub key: ObjectKey,
}

impl WatchEvent {
    /// Create a notification.
    pub const fn new(kind: WatchEventKind, key: ObjectKey) -> Self {
        Self { kind, key }
    }
}
