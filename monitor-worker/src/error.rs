use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the worker runtime, its socket protocol, and the
/// dead-letter file.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settings error: {0}")]
    Settings(#[from] monitor_core::SettingsError),

    #[error("fetcher error: {0}")]
    Fetch(#[from] monitor_sync::FetchError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("worker protocol error: {0}")]
    Protocol(String),

    /// The job failed and the worker recorded it in the dead-letter file.
    #[error("job failed and was dead-lettered: {0}")]
    JobDeadLettered(String),

    #[error("worker is not running (socket missing: {socket})")]
    WorkerNotRunning { socket: PathBuf },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> WorkerError {
    WorkerError::Io {
        path: path.into(),
        source,
    }
}
