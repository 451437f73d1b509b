//! Size-based rotation for `uvdeck.log`, applied once at startup.
//!
//! Backups are numbered newest-first: `uvdeck.log.1` is the most recent,
//! `uvdeck.log.<keep>` the oldest; anything beyond `keep` is discarded.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Rotate once the live file reaches this size (10 MiB).
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Backups retained next to the live file.
pub const MAX_ROTATED_FILES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub max_bytes: u64,
    pub keep: usize,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: MAX_LOG_BYTES,
            keep: MAX_ROTATED_FILES,
        }
    }
}

impl RotationPolicy {
    /// Shift backups up by one and move the live file to `.1` when it is
    /// oversized. Returns whether a rotation happened.
    ///
    /// A missing live file or missing backups are not errors. With `keep == 0`
    /// an oversized file is simply truncated.
    pub fn rotate(&self, log_path: &Path) -> io::Result<bool> {
        let size = match fs::metadata(log_path) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err),
        };
        if size < self.max_bytes {
            return Ok(false);
        }

        if self.keep == 0 {
            fs::File::create(log_path)?;
            return Ok(true);
        }

        ignore_missing(fs::remove_file(backup_path(log_path, self.keep)))?;
        for n in (1..self.keep).rev() {
            ignore_missing(fs::rename(
                backup_path(log_path, n),
                backup_path(log_path, n + 1),
            ))?;
        }
        fs::rename(log_path, backup_path(log_path, 1))?;
        fs::File::create(log_path)?;
        Ok(true)
    }
}

/// Rotate with the default policy, reporting failures on stderr.
///
/// Called before the subscriber is installed, so `tracing` is not available
/// yet. A failed rotation never blocks startup.
pub fn rotate_log(log_path: &Path) -> bool {
    RotationPolicy::default()
        .rotate(log_path)
        .unwrap_or_else(|err| {
            eprintln!("uvdeck: log rotation failed for {}: {err}", log_path.display());
            false
        })
}

/// `<dir>/<name>.<n>` for the live file `<dir>/<name>`.
pub fn backup_path(log_path: &Path, n: usize) -> PathBuf {
    let mut name = log_path
        .file_name()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "uvdeck.log".into());
    name.push(format!(".{n}"));
    log_path.with_file_name(name)
}

fn ignore_missing(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
