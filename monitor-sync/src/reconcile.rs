//! One reconciliation pass for one build.
//!
//! ## Pass order
//!
//! 1. Parse the previous snapshot payload.
//! 2. Fetch the remote view.
//! 3. Merge (remote wins where it reports a value).
//! 4. If the build has just failed → notify, with the merged snapshot.
//! 5. If a tracked field changed → persist the merged snapshot, then push it
//!    to its owner.
//!
//! Every collaborator error aborts the pass and propagates. Nothing is
//! retried here.

use std::sync::Arc;

use monitor_core::{merge, BuildId, BuildSnapshot};

use crate::change::{changed, changed_fields, transitioned_to_failed, TrackedField};
use crate::collaborators::{Broadcaster, Fetcher, Notifier, Persister};
use crate::error::ReconcileError;

/// What a completed pass decided.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub build_id: BuildId,
    /// Persist + push happened.
    pub changed: bool,
    /// The failure alert was raised.
    pub transitioned_to_failed: bool,
    pub changed_fields: Vec<TrackedField>,
    pub merged: BuildSnapshot,
}

/// Drives reconciliation passes against injected collaborators.
#[derive(Clone)]
pub struct Reconciler {
    fetcher: Arc<dyn Fetcher>,
    notifier: Arc<dyn Notifier>,
    persister: Arc<dyn Persister>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl Reconciler {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        notifier: Arc<dyn Notifier>,
        persister: Arc<dyn Persister>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            fetcher,
            notifier,
            persister,
            broadcaster,
        }
    }

    /// Reconcile the build described by a serialized previous snapshot.
    ///
    /// A malformed payload fails before any collaborator is called.
    pub fn reconcile(&self, payload: &str) -> Result<ReconcileOutcome, ReconcileError> {
        let previous = BuildSnapshot::parse(payload)?;
        self.reconcile_snapshot(previous)
    }

    /// Reconcile an already-parsed previous snapshot.
    pub fn reconcile_snapshot(
        &self,
        previous: BuildSnapshot,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let build_id = previous.id.clone();

        let update = self
            .fetcher
            .fetch(&previous)
            .map_err(|source| ReconcileError::Fetch {
                build: build_id.clone(),
                source,
            })?;
        let merged = merge(&previous, &update);

        let failed_now = transitioned_to_failed(&previous, &update);
        if failed_now {
            tracing::info!("build {} transitioned to failed; notifying", build_id);
            self.notifier
                .notify_build_failed(&merged)
                .map_err(|source| ReconcileError::Notify {
                    build: build_id.clone(),
                    source,
                })?;
        }

        let is_changed = changed(&previous, &update);
        let fields = changed_fields(&previous, &update);
        if is_changed {
            self.persister
                .update(&merged)
                .map_err(|source| ReconcileError::Store {
                    build: build_id.clone(),
                    source,
                })?;
            self.broadcaster
                .push(&merged.user.object_id, &merged)
                .map_err(|source| ReconcileError::Broadcast {
                    build: build_id.clone(),
                    source,
                })?;
            tracing::info!(
                "build {} updated ({}); pushed to {}",
                build_id,
                join_fields(&fields),
                merged.user.object_id
            );
        } else {
            tracing::debug!("build {} unchanged", build_id);
        }

        Ok(ReconcileOutcome {
            build_id,
            changed: is_changed,
            transitioned_to_failed: failed_now,
            changed_fields: fields,
            merged,
        })
    }
}

fn join_fields(fields: &[TrackedField]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
