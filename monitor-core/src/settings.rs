//! Process-wide settings, read once at startup and passed down.
//!
//! # Storage layout
//!
//! ```text
//! ~/.monitor/
//!   settings.yaml   (mode 0600)
//! ```
//!
//! # API pattern
//!
//! Every function has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// Default fetch timeout.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
/// Default bounded job-queue depth.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
/// Default delay between retry attempts, when retries are enabled.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 1_000;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub fetcher: FetcherSettings,
    #[serde(default)]
    pub worker: WorkerSettings,
}

/// How the remote build state is obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetcherSettings {
    /// Program and arguments. Receives the previous snapshot as JSON on
    /// stdin and prints the remote view as JSON on stdout.
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }
}

/// Job-queue behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSettings {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Extra attempts after a failed job. `0` keeps automatic retry off.
    #[serde(default)]
    pub retry_limit: u32,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
    /// Also publish failure alerts on the realtime channel.
    #[serde(default = "default_true")]
    pub forward_alerts: bool,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            retry_limit: 0,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            forward_alerts: true,
        }
    }
}

fn default_fetch_timeout() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_retry_backoff() -> u64 {
    DEFAULT_RETRY_BACKOFF_MS
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.monitor/`
pub fn monitor_root(home: &Path) -> PathBuf {
    home.join(".monitor")
}

/// `<home>/.monitor/settings.yaml`. Pure, no I/O.
pub fn settings_path_at(home: &Path) -> PathBuf {
    monitor_root(home).join("settings.yaml")
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load settings from `<home>/.monitor/settings.yaml`.
///
/// A missing file yields [`Settings::default`]; malformed YAML yields
/// `SettingsError::Parse` with the path.
pub fn load_at(home: &Path) -> Result<Settings, SettingsError> {
    let path = settings_path_at(home);
    if !path.exists() {
        return Ok(Settings::default());
    }
    let contents = std::fs::read_to_string(&path)?;
    if contents.trim().is_empty() {
        return Ok(Settings::default());
    }
    serde_yaml::from_str(&contents).map_err(|e| SettingsError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Settings, SettingsError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save settings: serialize → `.yaml.tmp` → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, settings: &Settings) -> Result<(), SettingsError> {
    let root = monitor_root(home);
    if !root.exists() {
        std::fs::create_dir_all(&root)?;
        set_dir_permissions(&root)?;
    }
    let path = settings_path_at(home);
    let tmp_path = path.with_file_name("settings.yaml.tmp");

    let yaml = serde_yaml::to_string(settings)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(settings: &Settings) -> Result<(), SettingsError> {
    save_at(&home()?, settings)
}

// ---------------------------------------------------------------------------
// 4. Init
// ---------------------------------------------------------------------------

/// Write default settings unless a file already exists (or `force` is set).
///
/// Returns the settings now on disk and whether a file was written.
pub fn init_at(home: &Path, force: bool) -> Result<(Settings, bool), SettingsError> {
    if settings_path_at(home).exists() && !force {
        return Ok((load_at(home)?, false));
    }
    let settings = Settings::default();
    save_at(home, &settings)?;
    Ok((settings, true))
}

/// `init_at` convenience wrapper.
pub fn init(force: bool) -> Result<(Settings, bool), SettingsError> {
    init_at(&home()?, force)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Resolve the user's home directory.
pub fn home() -> Result<PathBuf, SettingsError> {
    dirs::home_dir().ok_or(SettingsError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), SettingsError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), SettingsError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), SettingsError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), SettingsError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_home() -> TempDir {
        TempDir::new().expect("tempdir")
    }

    #[test]
    fn settings_path_is_correct() {
        let home = make_home();
        assert!(settings_path_at(home.path()).ends_with(".monitor/settings.yaml"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let home = make_home();
        let settings = load_at(home.path()).expect("load");
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.worker.retry_limit, 0, "retry must be off by default");
    }

    #[test]
    fn save_and_load_roundtrip() {
        let home = make_home();
        let mut settings = Settings::default();
        settings.fetcher.command = vec!["ci-status".to_string(), "--json".to_string()];
        settings.worker.queue_capacity = 8;
        save_at(home.path(), &settings).expect("save");
        assert_eq!(load_at(home.path()).expect("load"), settings);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let home = make_home();
        let root = monitor_root(home.path());
        std::fs::create_dir_all(&root).expect("mkdir");
        std::fs::write(settings_path_at(home.path()), "fetcher:\n  command: [ci-status]\n")
            .expect("write");

        let settings = load_at(home.path()).expect("load");
        assert_eq!(settings.fetcher.command, vec!["ci-status".to_string()]);
        assert_eq!(settings.fetcher.timeout_secs, DEFAULT_FETCH_TIMEOUT_SECS);
        assert_eq!(settings.worker, WorkerSettings::default());
    }

    #[test]
    fn atomic_write_cleans_up_tmp() {
        let home = make_home();
        save_at(home.path(), &Settings::default()).expect("save");
        let tmp = settings_path_at(home.path()).with_file_name("settings.yaml.tmp");
        assert!(!tmp.exists(), ".tmp must be gone after successful save");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(settings_path_at(home.path()))
                .unwrap()
                .permissions()
                .mode()
                & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[test]
    fn init_does_not_overwrite_without_force() {
        let home = make_home();
        let mut custom = Settings::default();
        custom.worker.queue_capacity = 3;
        save_at(home.path(), &custom).expect("save");

        let (loaded, written) = init_at(home.path(), false).expect("init");
        assert!(!written);
        assert_eq!(loaded.worker.queue_capacity, 3);

        let (reset, written) = init_at(home.path(), true).expect("init --force");
        assert!(written);
        assert_eq!(reset, Settings::default());
    }

    #[test]
    fn home_not_found_error_message() {
        assert!(SettingsError::HomeNotFound.to_string().contains("home directory"));
    }
}
