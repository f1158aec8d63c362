//! Snapshot store: file-backed data store for reconciled builds.
//!
//! Persists one [`StoredBuild`] JSON document per build at
//! `<home>/.monitor/builds/<build_id>.json`.
//! Writes use the atomic `.tmp` + rename pattern.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use monitor_core::{settings::monitor_root, BuildId, BuildSnapshot};

use crate::collaborators::Persister;
use crate::error::{store_io_err, StoreError};

/// On-disk store payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredBuild {
    pub stored_at: DateTime<Utc>,
    pub build: BuildSnapshot,
}

/// `<home>/.monitor/builds/`
pub fn store_dir_at(home: &Path) -> PathBuf {
    monitor_root(home).join("builds")
}

/// Path to the stored snapshot for `build_id`.
pub fn store_path_at(home: &Path, build_id: &BuildId) -> Result<PathBuf, StoreError> {
    let key = build_id.0.as_str();
    if key.is_empty() || key.contains(|c: char| c == '/' || c == '\\') || key == "." || key == ".." {
        return Err(StoreError::InvalidId(build_id.clone()));
    }
    Ok(store_dir_at(home).join(format!("{key}.json")))
}

/// Load the stored snapshot for `build_id`, or `None` if never stored.
pub fn load_at(home: &Path, build_id: &BuildId) -> Result<Option<StoredBuild>, StoreError> {
    let path = store_path_at(home, build_id)?;
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(store_io_err(&path, err)),
    };
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Save `build` atomically, stamping it with the current time.
///
/// Writes to `<path>.tmp` then renames to `<path>`.
pub fn save_at(home: &Path, build: &BuildSnapshot) -> Result<StoredBuild, StoreError> {
    let path = store_path_at(home, &build.id)?;
    let dir = store_dir_at(home);
    std::fs::create_dir_all(&dir).map_err(|e| store_io_err(&dir, e))?;

    let stored = StoredBuild {
        stored_at: Utc::now(),
        build: build.clone(),
    };
    let json = serde_json::to_string_pretty(&stored)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| store_io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(store_io_err(&path, e));
    }
    Ok(stored)
}

/// Every stored build, sorted by build id. Leftover `.tmp` files are skipped.
pub fn list_at(home: &Path) -> Result<Vec<StoredBuild>, StoreError> {
    let dir = store_dir_at(home);
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(vec![]),
        Err(err) => return Err(store_io_err(&dir, err)),
    };

    let mut builds = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| store_io_err(&dir, e))?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| store_io_err(&path, e))?;
        builds.push(serde_json::from_str::<StoredBuild>(&contents)?);
    }
    builds.sort_by(|a, b| a.build.id.cmp(&b.build.id));
    Ok(builds)
}

/// [`Persister`] backed by the snapshot store under one home directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    home: PathBuf,
}

impl SnapshotStore {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }
}

impl Persister for SnapshotStore {
    fn update(&self, build: &BuildSnapshot) -> Result<(), StoreError> {
        save_at(&self.home, build)?;
        tracing::debug!("stored build {}", build.id);
        Ok(())
    }
}
