#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use chrono::Utc;
use monitor_core::{settings, BuildId, Settings};
use monitor_sync::snapshot_store;
use monitor_worker::{dead_letter, DeadLetter};
use tempfile::TempDir;

const PAYLOAD: &str =
    r#"{"objectId":"b1","status":["running"],"branch":"main","commitSha":"abc","user":{"objectId":"u1"}}"#;

struct WorkerProcess {
    child: Child,
    binary: PathBuf,
    home: PathBuf,
}

impl WorkerProcess {
    fn start(binary: PathBuf, home: PathBuf) -> Self {
        let child = Command::new(&binary)
            .env("HOME", &home)
            .args(["worker", "start"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn worker");

        Self {
            child,
            binary,
            home,
        }
    }

    fn stop(&mut self) {
        let _ = Command::new(&self.binary)
            .env("HOME", &self.home)
            .args(["worker", "stop"])
            .status();

        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return;
            }
            sleep(Duration::from_millis(50));
        }

        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_running(binary: &Path, home: &Path) -> bool {
    let Ok(output) = Command::new(binary)
        .env("HOME", home)
        .args(["worker", "status"])
        .output()
    else {
        return false;
    };
    if !output.status.success() {
        return false;
    }

    serde_json::from_slice::<serde_json::Value>(&output.stdout)
        .ok()
        .and_then(|value| value.get("running").and_then(|v| v.as_bool()))
        .unwrap_or(false)
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(100));
    }
    false
}

const PASSING_FETCH: &str =
    r#"cat > /dev/null; echo '{"status":["passed"],"finishedAtTime":"2024-05-01T12:00:00Z"}'"#;

/// Write settings using `script` as the fetch command, start a worker, and
/// wait until it answers `status`.
fn start_worker(home: &TempDir, script: &str) -> (WorkerProcess, PathBuf) {
    let mut config = Settings::default();
    config.fetcher.command = vec!["sh".to_string(), "-c".to_string(), script.to_string()];
    settings::save_at(home.path(), &config).expect("save settings");

    let binary = assert_cmd::cargo::cargo_bin("monitor");
    let worker = WorkerProcess::start(binary.clone(), home.path().to_path_buf());
    assert!(
        wait_until(Duration::from_secs(5), || worker_running(&binary, home.path())),
        "worker did not report running state in time",
    );
    (worker, binary)
}

fn seed_dead_letter(home: &TempDir) {
    let entry = DeadLetter {
        failed_at: Utc::now(),
        build_id: Some("b1".to_string()),
        error: "fetch failed".to_string(),
        attempts: 1,
        source: "cli".to_string(),
        payload: PAYLOAD.to_string(),
    };
    dead_letter::append_at(home.path(), &entry).expect("seed dead letter");
}

#[test]
fn enqueued_job_updates_the_store() {
    let home = TempDir::new().expect("home");
    let (mut worker, binary) = start_worker(&home, PASSING_FETCH);

    let payload = home.path().join("payload.json");
    std::fs::write(&payload, PAYLOAD).expect("write payload");

    let output = Command::new(&binary)
        .env("HOME", home.path())
        .arg("enqueue")
        .arg(&payload)
        .arg("--json")
        .output()
        .expect("run enqueue");
    assert!(
        output.status.success(),
        "enqueue failed: {}",
        String::from_utf8_lossy(&output.stderr),
    );
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).expect("summary");
    assert_eq!(summary["changed"], true);
    assert_eq!(summary["transitioned_to_failed"], false);

    let stored = snapshot_store::load_at(home.path(), &BuildId::from("b1"))
        .expect("load")
        .expect("stored build");
    assert!(stored.build.status.contains("passed"));
    assert!(stored.build.finished_at_time.is_some());

    worker.stop();
    assert!(!worker_running(&binary, home.path()));
}

#[test]
fn replayed_job_leaves_the_dead_letter_file() {
    let home = TempDir::new().expect("home");
    seed_dead_letter(&home);
    let (mut worker, binary) = start_worker(&home, PASSING_FETCH);

    let output = Command::new(&binary)
        .env("HOME", home.path())
        .arg("replay")
        .output()
        .expect("run replay");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Replayed 1, failed again 0, kept 0."));

    assert!(dead_letter::list_at(home.path()).expect("list").is_empty());
    let stored = snapshot_store::load_at(home.path(), &BuildId::from("b1"))
        .expect("load")
        .expect("stored build");
    assert!(stored.build.status.contains("passed"));

    worker.stop();
}

#[test]
fn replay_that_fails_again_is_dead_lettered_once() {
    let home = TempDir::new().expect("home");
    seed_dead_letter(&home);
    let (mut worker, binary) = start_worker(&home, "cat > /dev/null; echo 'ci down' >&2; exit 1");

    let output = Command::new(&binary)
        .env("HOME", home.path())
        .arg("replay")
        .output()
        .expect("run replay");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Replayed 0, failed again 1, kept 0."));

    let entries = dead_letter::list_at(home.path()).expect("list");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].build_id.as_deref(), Some("b1"));
    assert_eq!(entries[0].source, "replay");
    assert_eq!(entries[0].payload, PAYLOAD);

    worker.stop();
}
