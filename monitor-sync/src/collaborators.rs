//! Contracts the reconciler drives.
//!
//! Implementations are injected into [`Reconciler::new`]; none is looked up
//! globally. All calls are blocking from the reconciler's point of view and
//! must return an error rather than hang.
//!
//! [`Reconciler::new`]: crate::Reconciler::new

use monitor_core::{BuildSnapshot, BuildUpdate, ObjectId};

use crate::error::{DeliveryError, FetchError, StoreError};

/// Obtains the remote build system's current view of a build.
pub trait Fetcher: Send + Sync {
    /// Fields the remote does not know about must be left `None`.
    fn fetch(&self, build: &BuildSnapshot) -> Result<BuildUpdate, FetchError>;
}

/// Raises the alert for a build that has just failed.
pub trait Notifier: Send + Sync {
    fn notify_build_failed(&self, build: &BuildSnapshot) -> Result<(), DeliveryError>;
}

/// Writes the reconciled snapshot to the data store.
pub trait Persister: Send + Sync {
    fn update(&self, build: &BuildSnapshot) -> Result<(), StoreError>;
}

/// Pushes a snapshot to a recipient over the realtime channel.
pub trait Broadcaster: Send + Sync {
    fn push(&self, recipient: &ObjectId, build: &BuildSnapshot) -> Result<(), DeliveryError>;
}
