//! Error types for monitor-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::BuildId;

/// A previous-snapshot payload could not be turned into a [`BuildSnapshot`].
///
/// [`BuildSnapshot`]: crate::types::BuildSnapshot
#[derive(Debug, Error)]
pub enum ParseError {
    /// The payload is not valid JSON or does not match the snapshot shape.
    #[error("malformed build payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("build payload has an empty objectId")]
    MissingId,

    /// Pushes are addressed by the owner, so a snapshot without one is unusable.
    #[error("build {build} has no owning user objectId")]
    MissingUser { build: BuildId },
}

/// All errors that can arise from settings operations.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file.
    #[error("failed to parse settings at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}
