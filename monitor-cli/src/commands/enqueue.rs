//! `monitor enqueue <payload-file | -> [--json]`

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use monitor_worker::{request_update_build, WorkerError};

/// Submit one serialized build snapshot for reconciliation.
#[derive(Args, Debug)]
pub struct EnqueueArgs {
    /// File holding the previous snapshot JSON, or `-` for stdin.
    pub payload: PathBuf,

    /// Print the job summary as JSON.
    #[arg(long)]
    pub json: bool,
}

impl EnqueueArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home_dir()?;
        let payload = read_payload(&self.payload)?;

        let summary = match request_update_build(&home, payload, "cli") {
            Ok(summary) => summary,
            Err(WorkerError::WorkerNotRunning { .. }) => {
                bail!("worker is not running; start it with `monitor worker start`")
            }
            Err(err @ WorkerError::JobDeadLettered(_)) => {
                return Err(err).context("update_build job failed; retry it with `monitor replay`")
            }
            Err(err) => return Err(err).context("update_build job failed"),
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("failed to render job summary")?
            );
            return Ok(());
        }

        let verdict = if summary.transitioned_to_failed {
            "FAILED".red().bold()
        } else if summary.changed {
            "UPDATED".green().bold()
        } else {
            "UNCHANGED".bright_black().bold()
        };
        println!("{verdict} build {} ({} ms)", summary.build_id, summary.duration_ms);
        if !summary.changed_fields.is_empty() {
            println!("  changed: {}", summary.changed_fields.join(", "));
        }
        Ok(())
    }
}

fn read_payload(source: &Path) -> Result<String> {
    if source.as_os_str() == "-" {
        let mut payload = String::new();
        std::io::stdin()
            .read_to_string(&mut payload)
            .context("failed to read payload from stdin")?;
        return Ok(payload);
    }
    std::fs::read_to_string(source)
        .with_context(|| format!("failed to read payload '{}'", source.display()))
}
