//! # monitor-sync
//!
//! Build reconciliation: compare what we know about a build with what the
//! remote build system reports, and propagate meaningful changes.
//!
//! Construct a [`Reconciler`] from the four [`collaborators`] and call
//! [`Reconciler::reconcile`] once per build-update job.

pub mod alert_log;
pub mod change;
pub mod collaborators;
pub mod command_fetcher;
pub mod error;
mod reconcile;
pub mod snapshot_store;

pub use alert_log::AlertLog;
pub use change::{changed, changed_fields, transitioned_to_failed, TrackedField};
pub use collaborators::{Broadcaster, Fetcher, Notifier, Persister};
pub use command_fetcher::CommandFetcher;
pub use error::{DeliveryError, FetchError, ReconcileError, StoreError};
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use snapshot_store::SnapshotStore;
