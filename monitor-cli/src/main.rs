//! Monitor: build-state reconciler CLI.
//!
//! # Usage
//!
//! ```text
//! monitor init [--force]
//! monitor enqueue <payload-file | -> [--json]
//! monitor builds [--json]
//! monitor failures [--json]
//! monitor replay [--build <id>]
//! monitor worker start|stop|status|logs|subscribe <user>
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    builds::BuildsArgs, enqueue::EnqueueArgs, failures::FailuresArgs, init::InitArgs,
    replay::ReplayArgs, worker::WorkerCommand,
};

#[derive(Parser, Debug)]
#[command(
    name = "monitor",
    version,
    about = "Reconcile stored build state with the remote build system",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default ~/.monitor/settings.yaml.
    Init(InitArgs),

    /// Submit an update-build job to the running worker.
    Enqueue(EnqueueArgs),

    /// List stored builds.
    Builds(BuildsArgs),

    /// List jobs that failed and were dead-lettered.
    Failures(FailuresArgs),

    /// Re-submit dead-lettered jobs to the running worker.
    Replay(ReplayArgs),

    /// Run and control the background worker.
    Worker {
        #[command(subcommand)]
        command: WorkerCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Enqueue(args) => args.run(),
        Commands::Builds(args) => args.run(),
        Commands::Failures(args) => args.run(),
        Commands::Replay(args) => args.run(),
        Commands::Worker { command } => commands::worker::run(command),
    }
}
