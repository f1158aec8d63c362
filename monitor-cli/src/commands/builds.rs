//! `monitor builds` — what the snapshot store currently holds.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use monitor_sync::snapshot_store::{self, StoredBuild};

/// Arguments for `monitor builds`.
#[derive(Args, Debug)]
pub struct BuildsArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct BuildRow {
    #[tabled(rename = "build")]
    build: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "branch")]
    branch: String,
    #[tabled(rename = "commit")]
    commit: String,
    #[tabled(rename = "finished")]
    finished: String,
    #[tabled(rename = "owner")]
    owner: String,
}

impl BuildsArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home_dir()?;
        let builds = snapshot_store::list_at(&home).context("failed to read snapshot store")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&builds).context("failed to serialize builds")?
            );
            return Ok(());
        }

        if builds.is_empty() {
            println!("No builds stored yet.");
            return Ok(());
        }

        let failed = builds.iter().filter(|b| b.build.status.is_failed()).count();
        println!("{} builds | {} failed", builds.len(), failed);
        let mut table = Table::new(builds.iter().map(row));
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

fn row(stored: &StoredBuild) -> BuildRow {
    let build = &stored.build;
    let status = if build.status.is_empty() {
        "-".to_string()
    } else {
        build.status.to_string()
    };
    BuildRow {
        build: build.id.to_string(),
        status: if build.status.is_failed() {
            status.red().bold().to_string()
        } else {
            status
        },
        branch: build.branch.clone(),
        commit: short_sha(&build.commit_sha),
        finished: build
            .finished_at_time
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string()),
        owner: build.user.object_id.to_string(),
    }
}

fn short_sha(sha: &str) -> String {
    sha.chars().take(8).collect()
}
