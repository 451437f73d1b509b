//! Settings resolution.
//!
//! # Storage layout
//!
//! ```text
//! ~/.uvdeck/
//!   config.yaml     (optional — mode 0600 when written by uvdeck)
//!   logs/
//!     uvdeck.log
//! ```
//!
//! # Precedence
//!
//! Every setting resolves as: runtime override > `config.yaml` > built-in default.
//!
//! As in the registry, functions come in pairs: `fn_at(home: &Path, …)` for
//! tests with a `TempDir`, and `fn(…)` deriving home from `dirs::home_dir()`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{config_io, ConfigError};

pub const DEFAULT_TOOL: &str = "uv";
pub const DEFAULT_OUTPUT_CAP: usize = 1000;
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_millis(3000);

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

pub fn uvdeck_dir(home: &Path) -> PathBuf {
    home.join(".uvdeck")
}

pub fn config_path(home: &Path) -> PathBuf {
    uvdeck_dir(home).join("config.yaml")
}

pub fn logs_dir(home: &Path) -> PathBuf {
    uvdeck_dir(home).join("logs")
}

/// `<home>/dev/py`, where projects live unless configured otherwise.
pub fn default_projects_root(home: &Path) -> PathBuf {
    home.join("dev").join("py")
}

// ---------------------------------------------------------------------------
// 2. Types
// ---------------------------------------------------------------------------

/// On-disk shape of `config.yaml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects_root: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_cap_lines: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_grace_ms: Option<u64>,
}

/// Values supplied at runtime (CLI flags, environment).
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub projects_root: Option<PathBuf>,
    pub tool: Option<String>,
}

/// Where the effective projects root came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RootSource {
    Override,
    ConfigFile,
    Default,
}

/// Effective settings, built once at startup and passed by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub home: PathBuf,
    pub projects_root: PathBuf,
    pub root_source: RootSource,
    /// Package-manager executable invoked for every operation.
    pub tool: String,
    /// Per-project output lines kept by the state store.
    pub output_cap: usize,
    /// Time between SIGTERM and SIGKILL on cancellation.
    pub cancel_grace: Duration,
}

impl Settings {
    /// Defaults rooted at `home`, without reading any file.
    pub fn defaults_at(home: &Path) -> Self {
        resolve(home, None, &Overrides::default())
    }
}

// ---------------------------------------------------------------------------
// 3. Resolution
// ---------------------------------------------------------------------------

/// Merge override, file and defaults. Pure — no I/O.
pub fn resolve(home: &Path, file: Option<&ConfigFile>, overrides: &Overrides) -> Settings {
    let file_root = file.and_then(|f| f.projects_root.clone());
    let (projects_root, root_source) = match (&overrides.projects_root, file_root) {
        (Some(root), _) => (expand_tilde(root, home), RootSource::Override),
        (None, Some(root)) => (expand_tilde(&root, home), RootSource::ConfigFile),
        (None, None) => (default_projects_root(home), RootSource::Default),
    };

    let tool = overrides
        .tool
        .clone()
        .or_else(|| file.and_then(|f| f.tool.clone()))
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TOOL.to_string());

    let output_cap = file
        .and_then(|f| f.output_cap_lines)
        .unwrap_or(DEFAULT_OUTPUT_CAP)
        .max(1);

    let cancel_grace = file
        .and_then(|f| f.cancel_grace_ms)
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_CANCEL_GRACE);

    Settings {
        home: home.to_path_buf(),
        projects_root,
        root_source,
        tool,
        output_cap,
        cancel_grace,
    }
}

/// Load `config.yaml` under `home` (if present) and resolve against `overrides`.
pub fn load_at(home: &Path, overrides: &Overrides) -> Result<Settings, ConfigError> {
    let file = load_file_at(home)?;
    Ok(resolve(home, file.as_ref(), overrides))
}

/// `load_at` convenience wrapper.
pub fn load(overrides: &Overrides) -> Result<Settings, ConfigError> {
    load_at(&home()?, overrides)
}

/// Read `config.yaml`. A missing file is `Ok(None)`; an empty one is the default.
pub fn load_file_at(home: &Path) -> Result<Option<ConfigFile>, ConfigError> {
    let path = config_path(home);
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(&path).map_err(|e| config_io(&path, e))?;
    if contents.trim().is_empty() {
        return Ok(Some(ConfigFile::default()));
    }
    serde_yaml::from_str(&contents)
        .map(Some)
        .map_err(|source| ConfigError::Parse { path, source })
}

// ---------------------------------------------------------------------------
// 4. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically write `config.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_file_at(home: &Path, file: &ConfigFile) -> Result<PathBuf, ConfigError> {
    let dir = uvdeck_dir(home);
    if !dir.exists() {
        fs::create_dir_all(&dir).map_err(|e| config_io(&dir, e))?;
        set_dir_permissions(&dir)?;
    }
    let path = config_path(home);
    let tmp_path = path.with_file_name("config.yaml.tmp");

    let yaml = serde_yaml::to_string(file)?;
    fs::write(&tmp_path, yaml).map_err(|e| config_io(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    fs::rename(&tmp_path, &path).map_err(|e| config_io(&path, e))?;
    Ok(path)
}

/// Persist a new projects root, keeping the other keys.
pub fn set_projects_root_at(home: &Path, root: &Path) -> Result<PathBuf, ConfigError> {
    let mut file = load_file_at(home)?.unwrap_or_default();
    file.projects_root = Some(root.to_path_buf());
    save_file_at(home, &file)
}

/// `set_projects_root_at` convenience wrapper.
pub fn set_projects_root(root: &Path) -> Result<PathBuf, ConfigError> {
    set_projects_root_at(&home()?, root)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

fn expand_tilde(path: &Path, home: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700)).map_err(|e| config_io(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| config_io(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
