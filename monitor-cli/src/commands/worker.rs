//! `monitor worker` — run and control the background worker.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use monitor_worker::paths::{err_log_path, log_path, socket_path};
use monitor_worker::{request_status, request_stop, start_blocking, subscribe, WorkerError};

#[derive(Subcommand, Debug)]
pub enum WorkerCommand {
    /// Run the worker in the foreground (job queue + socket server).
    Start,
    /// Request graceful worker shutdown over the Unix socket.
    Stop,
    /// Query worker status over the Unix socket.
    Status,
    /// Print recent worker log lines.
    Logs(WorkerLogsArgs),
    /// Print realtime events for one user as JSON lines.
    Subscribe(SubscribeArgs),
}

#[derive(Args, Debug)]
pub struct WorkerLogsArgs {
    /// Number of trailing lines to show.
    #[arg(long, default_value_t = 100)]
    pub lines: usize,

    /// Show only the error log.
    #[arg(long)]
    pub errors_only: bool,
}

#[derive(Args, Debug)]
pub struct SubscribeArgs {
    /// User object id whose builds to follow.
    pub recipient: String,

    /// Exit after this many events.
    #[arg(long)]
    pub count: Option<usize>,
}

pub fn run(command: WorkerCommand) -> Result<()> {
    let home = super::home_dir()?;

    match command {
        WorkerCommand::Start => {
            start_blocking(&home).context("worker exited with error")?;
        }
        WorkerCommand::Stop => match request_stop(&home) {
            Ok(()) => println!("worker stop requested"),
            Err(WorkerError::WorkerNotRunning { .. }) => {
                println!("worker is not running");
            }
            Err(err) => return Err(err).context("failed to stop worker"),
        },
        WorkerCommand::Status => {
            let status = match request_status(&home) {
                Ok(status) => status,
                Err(WorkerError::WorkerNotRunning { .. }) => serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                }),
                Err(err) => return Err(err).context("failed to query worker status"),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&status)
                    .context("failed to render worker status JSON")?
            );
        }
        WorkerCommand::Logs(args) => {
            if !args.errors_only {
                print_tail(&log_path(&home), args.lines)
                    .context("failed to read worker log")?;
            }
            print_tail(&err_log_path(&home), args.lines)
                .context("failed to read worker error log")?;
        }
        WorkerCommand::Subscribe(args) => {
            let mut remaining = args.count;
            let mut render_error = None;
            subscribe(&home, &args.recipient, |event| {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(err) => {
                        render_error = Some(err);
                        return false;
                    }
                }
                match remaining.as_mut() {
                    Some(left) => {
                        *left = left.saturating_sub(1);
                        *left > 0
                    }
                    None => true,
                }
            })
            .context("subscription ended with error")?;
            if let Some(err) = render_error {
                return Err(err).context("failed to render event");
            }
        }
    }

    Ok(())
}

fn print_tail(path: &Path, lines: usize) -> Result<()> {
    if !path.exists() {
        println!("log file not found: {}", path.display());
        return Ok(());
    }

    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut tail = VecDeque::<String>::with_capacity(lines);
    for line in BufReader::new(file).lines() {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        if lines == 0 {
            continue;
        }
        if tail.len() == lines {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    println!("==> {} <==", path.display());
    for line in tail {
        println!("{line}");
    }
    Ok(())
}
