use std::path::{Path, PathBuf};

pub use monitor_core::settings::monitor_root;

pub const WORKER_LOG: &str = "worker.log";
pub const WORKER_ERR_LOG: &str = "worker-err.log";
pub const WORKER_SOCKET: &str = "worker.sock";

pub fn socket_path(home: &Path) -> PathBuf {
    monitor_root(home).join(WORKER_SOCKET)
}

pub fn logs_dir(home: &Path) -> PathBuf {
    monitor_root(home).join("logs")
}

pub fn log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(WORKER_LOG)
}

pub fn err_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(WORKER_ERR_LOG)
}

pub fn failed_dir(home: &Path) -> PathBuf {
    monitor_root(home).join("failed")
}

pub fn dead_letter_path(home: &Path) -> PathBuf {
    failed_dir(home).join("jobs.jsonl")
}
