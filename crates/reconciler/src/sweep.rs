//! Ownership sweep run while a bundle is being deleted.

use std::sync::Arc;

use kealm_core::{ClusterId, LabelSelector, OWNED_BY_LABEL, Uid};
use kealm_store::WorkStore;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Deletes every work owned by a bundle, across all clusters.
#[derive(Clone)]
pub struct OwnershipSweeper {
    works: Arc<dyn WorkStore>,
}

impl OwnershipSweeper {
    /// Create a sweeper over a work store.
    pub fn new(works: Arc<dyn WorkStore>) -> Self {
        Self { works }
    }

    /// Delete the works labeled as owned by `owner`; returns how many were deleted.
    ///
    /// Works that vanish concurrently count as deleted by someone else. A
    /// failed sweep can be rerun: it lists again and deletes what remains.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the listing fails and [`Error::Sweep`] on
    /// the first failed delete.
    pub async fn sweep(&self, owner: &Uid) -> Result<usize> {
        let selector = LabelSelector::everything().with_equals(OWNED_BY_LABEL, owner.as_str());
        let owned = self.works.list(None, &selector).await?;
        debug!(owner = %owner, works = owned.len(), "Sweeping owned works");

        let mut deleted = 0usize;
        // Only works carrying this owner's label may be deleted, whatever the listing returned.
        for work in owned.into_iter().filter(|w| w.is_owned_by(owner)) {
            let cluster = ClusterId::new(work.metadata.namespace.clone());
            match self.works.delete(&cluster, &work.metadata.name).await {
                Ok(()) => deleted = deleted.saturating_add(1),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(Error::sweep(owner, work.key(), e)),
            }
        }

        info!(owner = %owner, deleted, "Swept owned works");
        Ok(deleted)
    }
}
