//! `tracing` subscriber setup.
//!
//! The terminal belongs to the front-end, so log records go to
//! `~/.uvdeck/logs/uvdeck.log`. Level filtering follows `RUST_LOG`, defaulting
//! to `info`.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::{fmt, EnvFilter};
use uvdeck_core::config::logs_dir;

use crate::error::{io_err, EngineError};
use crate::log_rotation;

pub const LOG_FILE: &str = "uvdeck.log";

pub fn log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(LOG_FILE)
}

/// Rotate the log file if oversized, then install the global subscriber.
///
/// Returns the log path. Installing twice is a no-op, so tests may call this
/// freely.
pub fn init(home: &Path) -> Result<PathBuf, EngineError> {
    let dir = logs_dir(home);
    fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

    let path = log_path(home);
    log_rotation::rotate_log(&path);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| io_err(&path, e))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
    Ok(path)
}
