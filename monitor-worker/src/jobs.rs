//! The update-build job: one reconciliation pass under a retry policy.

use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use monitor_core::{settings::WorkerSettings, BuildId};
use monitor_sync::{ReconcileError, ReconcileOutcome, Reconciler, TrackedField};

/// Retry policy for one job. The default runs every job exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobOptions {
    /// Extra attempts after the first failure.
    pub retry_limit: u32,
    pub backoff: Duration,
}

impl From<&WorkerSettings> for JobOptions {
    fn from(settings: &WorkerSettings) -> Self {
        Self {
            retry_limit: settings.retry_limit,
            backoff: Duration::from_millis(settings.retry_backoff_ms),
        }
    }
}

/// A job that ran out of attempts.
#[derive(Debug)]
pub struct JobFailure {
    pub error: ReconcileError,
    pub attempts: u32,
}

/// Reported back to whoever enqueued the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub build_id: BuildId,
    pub source: String,
    pub changed: bool,
    pub transitioned_to_failed: bool,
    pub changed_fields: Vec<String>,
    pub attempts: u32,
    pub duration_ms: u64,
}

impl JobSummary {
    pub fn new(outcome: &ReconcileOutcome, source: &str, attempts: u32, duration: Duration) -> Self {
        Self {
            build_id: outcome.build_id.clone(),
            source: source.to_string(),
            changed: outcome.changed,
            transitioned_to_failed: outcome.transitioned_to_failed,
            changed_fields: outcome
                .changed_fields
                .iter()
                .map(TrackedField::to_string)
                .collect(),
            attempts,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Run the job for `payload`, blocking the calling thread.
///
/// Malformed payloads fail on the first attempt regardless of the policy.
pub fn perform(
    reconciler: &Reconciler,
    payload: &str,
    options: &JobOptions,
) -> Result<(ReconcileOutcome, u32), JobFailure> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match reconciler.reconcile(payload) {
            Ok(outcome) => return Ok((outcome, attempts)),
            Err(error) if error.is_retryable() && attempts <= options.retry_limit => {
                tracing::warn!(
                    build = ?error.build_id(),
                    attempt = attempts,
                    error = %error,
                    "update_build attempt failed, retrying",
                );
                thread::sleep(options.backoff);
            }
            Err(error) => return Err(JobFailure { error, attempts }),
        }
    }
}

/// Timed wrapper around [`perform`] producing a [`JobSummary`].
pub fn perform_summarized(
    reconciler: &Reconciler,
    payload: &str,
    source: &str,
    options: &JobOptions,
) -> Result<JobSummary, JobFailure> {
    let started = Instant::now();
    let (outcome, attempts) = perform(reconciler, payload, options)?;
    Ok(JobSummary::new(&outcome, source, attempts, started.elapsed()))
}

/// Best-effort build id for a payload that may not parse as a snapshot.
pub fn build_id_hint(payload: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    ["objectId", "id"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}
