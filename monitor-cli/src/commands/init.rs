//! `monitor init [--force]`

use anyhow::{Context, Result};
use clap::Args;

use monitor_core::settings;

/// Write a default settings file.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing settings file with defaults.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home_dir()?;
        let path = settings::settings_path_at(&home);
        let (_, written) =
            settings::init_at(&home, self.force).context("failed to initialise settings")?;

        if written {
            println!("✓ Wrote default settings to {}", path.display());
            println!("  Set fetcher.command before starting the worker.");
        } else {
            println!(
                "Settings already exist at {} (use --force to overwrite)",
                path.display()
            );
        }
        Ok(())
    }
}
