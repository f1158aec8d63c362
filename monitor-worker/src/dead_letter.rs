//! Dead-letter file for jobs that failed for good.
//!
//! `<home>/.monitor/failed/jobs.jsonl`, one [`DeadLetter`] per line. The
//! original payload is kept verbatim so `monitor replay` can resubmit it.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{io_err, WorkerError};
use crate::paths::{dead_letter_path, failed_dir};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub failed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_id: Option<String>,
    pub error: String,
    pub attempts: u32,
    pub source: String,
    pub payload: String,
}

pub fn append_at(home: &Path, entry: &DeadLetter) -> Result<(), WorkerError> {
    let dir = failed_dir(home);
    fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

    let path = dead_letter_path(home);
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| io_err(&path, e))?;
    file.write_all(line.as_bytes())
        .map_err(|e| io_err(&path, e))
}

/// All entries, oldest first. Blank lines are ignored.
pub fn list_at(home: &Path) -> Result<Vec<DeadLetter>, WorkerError> {
    let path = dead_letter_path(home);
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(io_err(&path, err)),
    };
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(WorkerError::from))
        .collect()
}

/// Replace the file contents with `entries` (atomic `.tmp` + rename).
/// An empty list removes the file.
pub fn replace_at(home: &Path, entries: &[DeadLetter]) -> Result<(), WorkerError> {
    let path = dead_letter_path(home);
    if entries.is_empty() {
        return match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_err(&path, err)),
        };
    }

    let dir = failed_dir(home);
    fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    let mut body = String::new();
    for entry in entries {
        body.push_str(&serde_json::to_string(entry)?);
        body.push('\n');
    }
    let tmp = path.with_extension("jsonl.tmp");
    fs::write(&tmp, body).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = fs::rename(&tmp, &path) {
        let _ = fs::remove_file(&tmp);
        return Err(io_err(&path, e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(build_id: Option<&str>, error: &str) -> DeadLetter {
        DeadLetter {
            failed_at: Utc::now(),
            build_id: build_id.map(str::to_string),
            error: error.to_string(),
            attempts: 1,
            source: "socket".to_string(),
            payload: r#"{"objectId":"b1"}"#.to_string(),
        }
    }

    #[test]
    fn empty_when_nothing_failed() {
        let home = TempDir::new().unwrap();
        assert!(list_at(home.path()).unwrap().is_empty());
    }

    #[test]
    fn entries_append_in_order() {
        let home = TempDir::new().unwrap();
        append_at(home.path(), &entry(Some("b1"), "fetch failed")).unwrap();
        append_at(home.path(), &entry(None, "parse error")).unwrap();

        let entries = list_at(home.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].build_id.as_deref(), Some("b1"));
        assert_eq!(entries[1].build_id, None);
        assert_eq!(entries[1].error, "parse error");
    }

    #[test]
    fn replace_keeps_only_given_entries() {
        let home = TempDir::new().unwrap();
        append_at(home.path(), &entry(Some("b1"), "one")).unwrap();
        append_at(home.path(), &entry(Some("b2"), "two")).unwrap();

        replace_at(home.path(), &[entry(Some("b2"), "two")]).unwrap();
        let entries = list_at(home.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].build_id.as_deref(), Some("b2"));

        replace_at(home.path(), &[]).unwrap();
        assert!(!dead_letter_path(home.path()).exists());
        replace_at(home.path(), &[]).unwrap();
    }
}
