pub mod builds;
pub mod enqueue;
pub mod failures;
pub mod init;
pub mod replay;
pub mod worker;

use std::path::PathBuf;

use anyhow::{Context, Result};

pub(crate) fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}
