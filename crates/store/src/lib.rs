//! Store interfaces for the bundle controller's external collaborators.
//!
//! Three stores are consumed:
//!
//! - [`BundleStore`] holds the desired-state bundles and notifies watchers of
//!   every change.
//! - [`PlacementDecisionLister`] is a read-only index of scheduler decisions.
//! - [`WorkStore`] holds manifest works, namespaced by target cluster.
//!
//! Every operation is a potential suspension point. Writes are single atomic
//! operations guarded by resource versions: a stale update fails with
//! [`StoreError::Conflict`] and the caller is expected to re-read.
//!
//! The in-memory implementations follow the same rules and additionally
//! support failure injection through [`FaultInjector`].

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod bundle;
pub mod error;
pub mod fault;
pub mod placement;
pub mod watch;
pub mod work;

pub use bundle::{BundleStore, InMemoryBundleStore};
pub use error::{Result, StoreError};
pub use fault::{FaultInjector, Operation};
pub use placement::{InMemoryPlacementDecisions, PlacementDecisionLister};
pub use watch::{WatchEvent, WatchEventKind};
pub use work::{InMemoryWorkStore, TracingWorkStore, WorkStore};
