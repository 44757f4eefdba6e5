//! File logging
//!
//! The pane draws over the whole terminal, so tracing output goes to
//! ~/.local/state/draftpane/draftpane.log. Filter with DRAFTPANE_LOG
//! (same syntax as RUST_LOG), default `info`.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config;

pub const LOG_ENV: &str = "DRAFTPANE_LOG";

pub fn log_path() -> Result<PathBuf> {
    Ok(config::state_dir()?.join("draftpane.log"))
}

/// Install the global subscriber; returns the log file path
pub fn init() -> Result<PathBuf> {
    config::ensure_dirs()?;
    let path = log_path()?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install logger: {}", e))?;

    Ok(path)
}
