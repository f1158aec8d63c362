//! `monitor replay [--build <id>]`
//!
//! Resubmits dead-lettered payloads to the running worker. Selected entries
//! are taken off the dead-letter file first. An entry is dropped only once
//! the worker confirms it either ran the job or dead-lettered it anew; on any
//! other outcome the entry is put back.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use monitor_worker::{dead_letter, request_status, request_update_build, DeadLetter, WorkerError};

/// Arguments for `monitor replay`.
#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Only replay entries for this build id.
    #[arg(long)]
    pub build: Option<String>,
}

impl ReplayArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home_dir()?;
        let entries = dead_letter::list_at(&home).context("failed to read dead-letter file")?;

        let (selected, kept): (Vec<DeadLetter>, Vec<DeadLetter>) =
            entries.into_iter().partition(|entry| match &self.build {
                Some(build) => entry.build_id.as_deref() == Some(build.as_str()),
                None => true,
            });
        if selected.is_empty() {
            println!("Nothing to replay.");
            return Ok(());
        }

        request_status(&home).context("worker must be running to replay jobs")?;
        dead_letter::replace_at(&home, &kept).context("failed to update dead-letter file")?;

        let mut replayed = 0usize;
        let mut failed_again = 0usize;
        let mut restored = Vec::new();
        for entry in selected {
            let label = entry.build_id.clone().unwrap_or_else(|| "?".to_string());
            match request_update_build(&home, entry.payload.clone(), "replay") {
                Ok(_) => {
                    replayed += 1;
                    println!("{} {label}", "✓".green());
                }
                Err(WorkerError::JobDeadLettered(message)) => {
                    failed_again += 1;
                    println!("{} {label}: {message}", "✗".red());
                }
                Err(err) => {
                    println!("{} {label}: kept ({err})", "!".yellow());
                    restored.push(entry);
                }
            }
        }

        for entry in &restored {
            dead_letter::append_at(&home, entry)
                .context("failed to restore dead-letter entry")?;
        }

        println!(
            "Replayed {replayed}, failed again {failed_again}, kept {}.",
            restored.len()
        );
        Ok(())
    }
}
