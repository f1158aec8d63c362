//! Error types for monitor-sync.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use monitor_core::{BuildId, ParseError};

/// The remote build system could not produce a usable view of a build.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("remote build system unreachable: {0}")]
    Unreachable(String),

    #[error("remote build system did not answer within {0:?}")]
    Timeout(Duration),

    #[error("remote build system returned unusable data: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("could not encode build for the fetch command: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("no fetch command configured; set fetcher.command in settings.yaml")]
    NotConfigured,
}

/// An alert or realtime push could not be handed to its channel.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("{channel} channel unreachable: {reason}")]
    Unreachable {
        channel: &'static str,
        reason: String,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not encode delivery: {0}")]
    Json(#[from] serde_json::Error),
}

/// The reconciled snapshot could not be written to the data store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot store JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The id cannot be used as a store key (empty or contains a path separator).
    #[error("build id '{0}' cannot be used as a store key")]
    InvalidId(BuildId),
}

/// Everything that can abort one reconciliation pass.
///
/// Collaborator failures carry the build id so the job runner can report
/// which update was dropped.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("fetch failed for build {build}: {source}")]
    Fetch {
        build: BuildId,
        #[source]
        source: FetchError,
    },

    #[error("failure alert for build {build} not delivered: {source}")]
    Notify {
        build: BuildId,
        #[source]
        source: DeliveryError,
    },

    #[error("store update for build {build} failed: {source}")]
    Store {
        build: BuildId,
        #[source]
        source: StoreError,
    },

    #[error("push for build {build} not delivered: {source}")]
    Broadcast {
        build: BuildId,
        #[source]
        source: DeliveryError,
    },
}

impl ReconcileError {
    /// The build the failed pass was about, when the payload got that far.
    pub fn build_id(&self) -> Option<&BuildId> {
        match self {
            ReconcileError::Parse(_) => None,
            ReconcileError::Fetch { build, .. }
            | ReconcileError::Notify { build, .. }
            | ReconcileError::Store { build, .. }
            | ReconcileError::Broadcast { build, .. } => Some(build),
        }
    }

    /// Whether re-running the same payload could succeed. A malformed
    /// payload never will.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ReconcileError::Parse(_))
    }
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn store_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`DeliveryError::Io`].
pub(crate) fn delivery_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DeliveryError {
    DeliveryError::Io {
        path: path.into(),
        source,
    }
}
