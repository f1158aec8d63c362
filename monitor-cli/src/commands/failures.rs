//! `monitor failures` — dead-lettered update-build jobs.

use anyhow::{Context, Result};
use clap::Args;
use tabled::{settings::Style, Table, Tabled};

use monitor_worker::dead_letter;

const ERROR_WIDTH: usize = 60;

/// Arguments for `monitor failures`.
#[derive(Args, Debug)]
pub struct FailuresArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct FailureRow {
    #[tabled(rename = "failed at")]
    failed_at: String,
    #[tabled(rename = "build")]
    build: String,
    #[tabled(rename = "source")]
    source: String,
    #[tabled(rename = "attempts")]
    attempts: u32,
    #[tabled(rename = "error")]
    error: String,
}

impl FailuresArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home_dir()?;
        let entries = dead_letter::list_at(&home).context("failed to read dead-letter file")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&entries).context("failed to serialize failures")?
            );
            return Ok(());
        }

        if entries.is_empty() {
            println!("No failed jobs.");
            return Ok(());
        }

        let rows = entries.into_iter().map(|entry| FailureRow {
            failed_at: entry.failed_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            build: entry.build_id.unwrap_or_else(|| "?".to_string()),
            source: entry.source,
            attempts: entry.attempts,
            error: truncate(&entry.error, ERROR_WIDTH),
        });
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        println!("Run 'monitor replay' to resubmit them.");
        Ok(())
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut short: String = text.chars().take(width.saturating_sub(1)).collect();
    short.push('…');
    short
}
