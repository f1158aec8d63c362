//! Worker log output and size-based rotation.
//!
//! Every event goes to stdout and `worker.log`; errors (including dropped
//! jobs) also go to `worker-err.log`. Files are reopened per event, so a
//! rotation takes effect on the next line without restarting the worker.
//!
//! Rotation: once a file reaches [`MAX_LOG_BYTES`] it becomes `<name>.1`,
//! older copies shift up, and at most [`MAX_ROTATED_FILES`] are kept.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing_subscriber::fmt::MakeWriter;

use crate::paths::{err_log_path, log_path};

pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
pub const MAX_ROTATED_FILES: usize = 5;

/// Set to `json` for one JSON object per log line.
pub const LOG_FORMAT_ENV: &str = "MONITOR_LOG_FORMAT";

/// Install the worker's tracing subscriber. `RUST_LOG` overrides the default
/// `info` filter. Library crates logging through `log` are bridged.
pub fn init_tracing(home: &Path) {
    use tracing::Level;
    use tracing_subscriber::{fmt, fmt::writer::MakeWriterExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let writer = io::stdout
        .and(LogFile::new(log_path(home)))
        .and(LogFile::new(err_log_path(home)).with_max_level(Level::ERROR));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer);

    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|format| format == "json");
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// A log file opened in append mode for each event.
#[derive(Debug, Clone)]
pub struct LogFile {
    path: PathBuf,
}

impl LogFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = LogFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogFileWriter(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .ok(),
        )
    }
}

/// Drops output silently when the log file could not be opened; stdout
/// still carries the event.
pub struct LogFileWriter(Option<File>);

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.0.as_mut() {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.0.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// Rotate `path` once it holds at least `max_bytes`. Returns whether it did.
/// A missing file is not an error.
pub fn rotate_if_needed(path: &Path, max_bytes: u64, keep: usize) -> io::Result<bool> {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if size < max_bytes {
        return Ok(false);
    }

    let oldest = rotated_path(path, keep);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..keep).rev() {
        let from = rotated_path(path, n);
        if from.exists() {
            fs::rename(&from, rotated_path(path, n + 1))?;
        }
    }
    fs::rename(path, rotated_path(path, 1))?;
    File::create(path)?;
    Ok(true)
}

/// Rotate both worker log files; failures are logged, never fatal.
pub fn rotate_logs(home: &Path) {
    for path in [log_path(home), err_log_path(home)] {
        match rotate_if_needed(&path, MAX_LOG_BYTES, MAX_ROTATED_FILES) {
            Ok(true) => tracing::info!(path = %path.display(), "log file rotated"),
            Ok(false) => {}
            Err(err) => tracing::warn!(path = %path.display(), error = %err, "log rotation failed"),
        }
    }
}

fn rotated_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("worker.log");
    base.with_file_name(format!("{name}.{n}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn small_or_missing_files_are_left_alone() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("worker.log");
        assert!(!rotate_if_needed(&log, 16, 3).unwrap());

        fs::write(&log, b"short").unwrap();
        assert!(!rotate_if_needed(&log, 16, 3).unwrap());
        assert!(!rotated_path(&log, 1).exists());
    }

    #[test]
    fn oversized_file_is_shifted_and_truncated() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("worker.log");
        fs::write(&log, vec![b'x'; 32]).unwrap();

        assert!(rotate_if_needed(&log, 16, 3).unwrap());
        assert_eq!(fs::metadata(&log).unwrap().len(), 0);
        assert_eq!(fs::read(rotated_path(&log, 1)).unwrap().len(), 32);
    }

    #[test]
    fn only_the_newest_copies_are_kept() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("worker.log");
        for round in 0..5u8 {
            fs::write(&log, vec![b'a' + round; 32]).unwrap();
            rotate_if_needed(&log, 16, 3).unwrap();
        }

        assert!(rotated_path(&log, 3).exists());
        assert!(!rotated_path(&log, 4).exists());
        // Newest rotation (round 4 → 'e') sits in .1.
        assert_eq!(fs::read(rotated_path(&log, 1)).unwrap()[0], b'e');
        assert_eq!(fs::read(rotated_path(&log, 3)).unwrap()[0], b'c');
    }

    #[test]
    fn log_file_writer_appends() {
        let dir = TempDir::new().unwrap();
        let file = LogFile::new(dir.path().join("worker.log"));
        file.make_writer().write_all(b"one\n").unwrap();
        file.make_writer().write_all(b"two\n").unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("worker.log")).unwrap(),
            "one\ntwo\n"
        );
    }

    #[test]
    fn log_file_writer_swallows_open_failures() {
        let dir = TempDir::new().unwrap();
        let file = LogFile::new(dir.path().join("missing-dir").join("worker.log"));
        assert!(file.make_writer().write_all(b"dropped\n").is_ok());
    }
}
