use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};

use monitor_core::{settings, ObjectId, Settings};
use monitor_sync::{AlertLog, CommandFetcher, Reconciler, SnapshotStore};

use crate::dead_letter::{self, DeadLetter};
use crate::error::{io_err, WorkerError};
use crate::jobs::{build_id_hint, perform_summarized, JobOptions, JobSummary};
use crate::logging::{init_tracing, rotate_logs};
use crate::paths::{dead_letter_path, logs_dir, monitor_root, socket_path};
use crate::protocol::{WorkerRequest, WorkerResponse};
use crate::push::{PushChannel, RealtimeNotifier, SocketBroadcaster};

const LOG_ROTATION_INTERVAL: Duration = Duration::from_secs(5);
const STOPPED_BEFORE_RUN: &str = "worker stopped before job ran";

struct UpdateBuildJob {
    payload: String,
    source: String,
    respond_to: oneshot::Sender<Result<JobSummary, JobRejected>>,
}

/// A job that produced no summary. `dead_lettered` is false only when the
/// dead-letter write itself failed.
#[derive(Debug, Clone)]
struct JobRejected {
    message: String,
    dead_lettered: bool,
}

/// Counters reported by `status`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerStats {
    pub processed: u64,
    pub failed: u64,
    pub last_job_at_unix: u64,
}

/// State shared by every socket connection.
#[derive(Clone)]
struct WorkerContext {
    home: PathBuf,
    stats: Arc<RwLock<WorkerStats>>,
    job_tx: mpsc::Sender<UpdateBuildJob>,
    shutdown_tx: broadcast::Sender<()>,
    channel: PushChannel,
    started_at_unix: u64,
}

/// Load settings, install logging, and run the worker on a fresh runtime
/// until it is stopped.
pub fn start_blocking(home: &Path) -> Result<(), WorkerError> {
    let settings = settings::load_at(home)?;
    ensure_runtime_dirs(home)?;
    init_tracing(home);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), settings))
}

/// Run the worker: job processor, socket server, log rotation and the
/// ctrl-c handler. Returns once all of them have stopped.
pub async fn run(home: PathBuf, settings: Settings) -> Result<(), WorkerError> {
    ensure_runtime_dirs(&home)?;

    let channel = PushChannel::default();
    let reconciler = build_reconciler(&home, &settings, &channel)?;
    let options = JobOptions::from(&settings.worker);
    let stats = Arc::new(RwLock::new(WorkerStats::default()));

    let (job_tx, job_rx) = mpsc::channel::<UpdateBuildJob>(settings.worker.queue_capacity.max(1));
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    tracing::info!(
        home = %home.display(),
        retry_limit = options.retry_limit,
        queue_capacity = settings.worker.queue_capacity,
        "worker starting",
    );

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let stats = stats.clone();
        tokio::spawn(async move {
            let result = job_processor_task(
                home,
                reconciler,
                options,
                stats,
                job_rx,
                shutdown.subscribe(),
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let context = WorkerContext {
            home: home.clone(),
            stats,
            job_tx,
            shutdown_tx: shutdown_tx.clone(),
            channel,
            started_at_unix: unix_seconds_now(),
        };
        tokio::spawn(async move {
            let result = socket_server_task(context, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let rotation_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        tokio::spawn(async move {
            let result = log_rotation_task(home, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down worker");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(WorkerError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (processor_result, socket_result, rotation_result, signal_result) = tokio::join!(
        processor_handle,
        socket_handle,
        rotation_handle,
        signal_handle
    );

    handle_join("job_processor", processor_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("log_rotation", rotation_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("worker stopped");
    Ok(())
}

fn build_reconciler(
    home: &Path,
    settings: &Settings,
    channel: &PushChannel,
) -> Result<Reconciler, WorkerError> {
    let fetcher = CommandFetcher::from_settings(&settings.fetcher)?;
    let forward = settings.worker.forward_alerts.then(|| channel.clone());
    Ok(Reconciler::new(
        Arc::new(fetcher),
        Arc::new(RealtimeNotifier::new(AlertLog::new(home), forward)),
        Arc::new(SnapshotStore::new(home)),
        Arc::new(SocketBroadcaster::new(channel.clone())),
    ))
}

async fn job_processor_task(
    home: PathBuf,
    reconciler: Reconciler,
    options: JobOptions,
    stats: Arc<RwLock<WorkerStats>>,
    mut job_rx: mpsc::Receiver<UpdateBuildJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), WorkerError> {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            maybe_job = job_rx.recv() => {
                let Some(job) = maybe_job else { break };

                let home = home.clone();
                let reconciler = reconciler.clone();
                let UpdateBuildJob { payload, source, respond_to } = job;
                let outcome = tokio::task::spawn_blocking(move || {
                    execute_job(&home, &reconciler, &options, &payload, &source)
                })
                .await
                .map_err(|err| WorkerError::Protocol(format!("job task join error: {err}")))?;

                {
                    let mut stats = stats.write().await;
                    stats.processed += 1;
                    if outcome.is_err() {
                        stats.failed += 1;
                    }
                    stats.last_job_at_unix = unix_seconds_now();
                }

                let _ = respond_to.send(outcome);
            }
        }
    }

    // Jobs still queued at shutdown never run; they are dead-lettered so a
    // replay can pick them up.
    job_rx.close();
    while let Ok(job) = job_rx.try_recv() {
        let UpdateBuildJob { payload, source, respond_to } = job;
        let rejected = dead_letter_job(&home, &payload, &source, None, STOPPED_BEFORE_RUN, 0);
        stats.write().await.failed += 1;
        let _ = respond_to.send(Err(rejected));
    }

    Ok(())
}

/// Run one job to completion. A job that fails for good is logged and
/// dead-lettered.
fn execute_job(
    home: &Path,
    reconciler: &Reconciler,
    options: &JobOptions,
    payload: &str,
    source: &str,
) -> Result<JobSummary, JobRejected> {
    match perform_summarized(reconciler, payload, source, options) {
        Ok(summary) => {
            tracing::info!(
                build = %summary.build_id,
                source = %summary.source,
                changed = summary.changed,
                failed = summary.transitioned_to_failed,
                attempts = summary.attempts,
                duration_ms = summary.duration_ms,
                "update_build job completed",
            );
            Ok(summary)
        }
        Err(failure) => Err(dead_letter_job(
            home,
            payload,
            source,
            failure.error.build_id().map(|id| id.0.clone()),
            &failure.error.to_string(),
            failure.attempts,
        )),
    }
}

/// Log a job that will not succeed and append it to the dead-letter file.
fn dead_letter_job(
    home: &Path,
    payload: &str,
    source: &str,
    build_id: Option<String>,
    message: &str,
    attempts: u32,
) -> JobRejected {
    let build_id = build_id.or_else(|| build_id_hint(payload));
    tracing::error!(
        build = build_id.as_deref().unwrap_or("<unknown>"),
        source = %source,
        attempts,
        error = %message,
        "update_build job failed",
    );

    let entry = DeadLetter {
        failed_at: Utc::now(),
        build_id,
        error: message.to_string(),
        attempts,
        source: source.to_string(),
        payload: payload.to_string(),
    };
    let dead_lettered = match dead_letter::append_at(home, &entry) {
        Ok(()) => true,
        Err(err) => {
            tracing::error!(error = %err, "failed to record dead-lettered job");
            false
        }
    };
    JobRejected {
        message: message.to_string(),
        dead_lettered,
    }
}

async fn socket_server_task(
    context: WorkerContext,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), WorkerError> {
    let socket = socket_path(&context.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "worker socket listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let context = context.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, context).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(stream: UnixStream, context: WorkerContext) -> Result<(), WorkerError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("worker socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: WorkerRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_json_line(
                    &mut writer,
                    &WorkerResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = match request.cmd.as_str() {
            "status" => WorkerResponse::ok(build_status_payload(&context).await),
            "update_build" => match request.payload {
                Some(payload) => {
                    let source = request.source.unwrap_or_else(|| "socket".to_string());
                    match enqueue_job(&context.job_tx, payload, source).await {
                        Ok(summary) => WorkerResponse::ok(json!(summary)),
                        Err(WorkerError::JobDeadLettered(message)) => {
                            WorkerResponse::dead_lettered(message)
                        }
                        Err(err) => WorkerResponse::error(err.to_string()),
                    }
                }
                None => WorkerResponse::error("update_build requires a payload"),
            },
            "subscribe" => match request.recipient.filter(|r| !r.is_empty()) {
                Some(recipient) => {
                    let events = context.channel.subscribe();
                    write_json_line(
                        &mut writer,
                        &WorkerResponse::ok(json!({ "subscribed": recipient })),
                    )
                    .await?;
                    let recipient = ObjectId::from(recipient);
                    return stream_events(
                        &recipient,
                        events,
                        &mut lines,
                        &mut writer,
                        context.shutdown_tx.subscribe(),
                    )
                    .await;
                }
                None => WorkerResponse::error("subscribe requires a recipient"),
            },
            "stop" => {
                let _ = context.shutdown_tx.send(());
                write_json_line(&mut writer, &WorkerResponse::ok(json!({ "stopping": true })))
                    .await?;
                break;
            }
            other => WorkerResponse::error(format!("unknown command '{other}'")),
        };

        write_json_line(&mut writer, &response).await?;
    }

    Ok(())
}

/// Forward events addressed to `recipient` until the client hangs up or the
/// worker stops.
async fn stream_events(
    recipient: &ObjectId,
    mut events: broadcast::Receiver<crate::push::PushEvent>,
    lines: &mut Lines<BufReader<OwnedReadHalf>>,
    writer: &mut OwnedWriteHalf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), WorkerError> {
    tracing::info!(recipient = %recipient, "subscriber connected");
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            line = lines.next_line() => {
                // Anything but more input means the client went away.
                match line {
                    Ok(Some(_)) => continue,
                    Ok(None) | Err(_) => break,
                }
            }
            event = events.recv() => match event {
                Ok(event) if &event.recipient == recipient => {
                    if write_json_line(writer, &event).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(recipient = %recipient, skipped, "subscriber lagging, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    tracing::info!(recipient = %recipient, "subscriber disconnected");
    Ok(())
}

async fn build_status_payload(context: &WorkerContext) -> Value {
    let stats = context.stats.read().await.clone();
    json!({
        "running": true,
        "started_at_unix": context.started_at_unix,
        "jobs_processed": stats.processed,
        "jobs_failed": stats.failed,
        "last_job_at_unix": stats.last_job_at_unix,
        "subscribers": context.channel.receiver_count(),
        "socket": socket_path(&context.home).display().to_string(),
        "dead_letter": dead_letter_path(&context.home).display().to_string(),
    })
}

async fn enqueue_job(
    job_tx: &mpsc::Sender<UpdateBuildJob>,
    payload: String,
    source: String,
) -> Result<JobSummary, WorkerError> {
    let (tx, rx) = oneshot::channel();
    job_tx
        .send(UpdateBuildJob {
            payload,
            source,
            respond_to: tx,
        })
        .await
        .map_err(|_| WorkerError::ChannelClosed("job queue"))?;

    let outcome = rx
        .await
        .map_err(|_| WorkerError::ChannelClosed("job response"))?;
    outcome.map_err(|rejected| {
        if rejected.dead_lettered {
            WorkerError::JobDeadLettered(rejected.message)
        } else {
            WorkerError::Protocol(rejected.message)
        }
    })
}

async fn log_rotation_task(
    home: PathBuf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), WorkerError> {
    let mut interval = tokio::time::interval(LOG_ROTATION_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let home = home.clone();
                // Rotation failures are logged inside rotate_logs.
                tokio::task::spawn_blocking(move || rotate_logs(&home)).await.ok();
            }
        }
    }
    Ok(())
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), WorkerError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(WorkerError::Protocol(format!(
                "worker socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale worker socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), WorkerError> {
    for dir in [monitor_root(home), logs_dir(home)] {
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    }
    Ok(())
}

async fn write_json_line<T: Serialize>(
    writer: &mut OwnedWriteHalf,
    value: &T,
) -> Result<(), WorkerError> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(|e| io_err("worker socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("worker socket flush", e))
}

fn handle_join(
    task: &str,
    result: Result<Result<(), WorkerError>, tokio::task::JoinError>,
) -> Result<(), WorkerError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(WorkerError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), WorkerError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), WorkerError> {
    Ok(())
}
