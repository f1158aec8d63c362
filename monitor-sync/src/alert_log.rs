//! Failure alerts as an append-only JSON-lines log.
//!
//! `<home>/.monitor/alerts.jsonl`, one [`AlertRecord`] per line.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use monitor_core::{settings::monitor_root, BuildId, BuildSnapshot, ObjectId, StatusSet};

use crate::collaborators::Notifier;
use crate::error::{delivery_io_err, DeliveryError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub raised_at: DateTime<Utc>,
    pub build_id: BuildId,
    pub recipient: ObjectId,
    pub status: StatusSet,
    pub branch: String,
    pub commit_sha: String,
}

impl AlertRecord {
    pub fn for_build(build: &BuildSnapshot) -> Self {
        Self {
            raised_at: Utc::now(),
            build_id: build.id.clone(),
            recipient: build.user.object_id.clone(),
            status: build.status.clone(),
            branch: build.branch.clone(),
            commit_sha: build.commit_sha.clone(),
        }
    }
}

pub fn alerts_path_at(home: &Path) -> PathBuf {
    monitor_root(home).join("alerts.jsonl")
}

/// Append one record to the alert log.
pub fn append_at(home: &Path, record: &AlertRecord) -> Result<(), DeliveryError> {
    let path = alerts_path_at(home);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| delivery_io_err(dir, e))?;
    }
    let mut line = serde_json::to_string(record)?;
    line.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| delivery_io_err(&path, e))?;
    file.write_all(line.as_bytes())
        .map_err(|e| delivery_io_err(&path, e))?;
    Ok(())
}

/// [`Notifier`] that records failure alerts in the alert log.
#[derive(Debug, Clone)]
pub struct AlertLog {
    home: PathBuf,
}

impl AlertLog {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }
}

impl Notifier for AlertLog {
    fn notify_build_failed(&self, build: &BuildSnapshot) -> Result<(), DeliveryError> {
        append_at(&self.home, &AlertRecord::for_build(build))?;
        tracing::warn!(
            "build {} failed on {} at {}",
            build.id,
            build.branch,
            build.commit_sha
        );
        Ok(())
    }
}
