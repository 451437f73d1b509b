//! Domain types shared by the registry, the engine and the front-end.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identity of a project: the absolute path of its root directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(pub PathBuf);

impl ProjectId {
    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Last path component, used as the display name.
    pub fn folder_name(&self) -> String {
        self.0
            .file_name()
            .unwrap_or_else(|| self.0.as_os_str())
            .to_string_lossy()
            .into_owned()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl From<PathBuf> for ProjectId {
    fn from(p: PathBuf) -> Self {
        Self(p)
    }
}

impl From<&Path> for ProjectId {
    fn from(p: &Path) -> Self {
        Self(p.to_path_buf())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// The intent behind an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    Init,
    AddDependency,
    RemoveDependency,
    Sync,
    RunCustom,
    Delete,
    Archive,
}

impl OperationKind {
    /// Kinds that remove the project directory and need an explicit confirmation.
    pub fn requires_confirmation(self) -> bool {
        matches!(self, OperationKind::Delete | OperationKind::Archive)
    }

    /// Kinds after which cached project metadata is out of date.
    pub fn changes_metadata(self) -> bool {
        !matches!(self, OperationKind::RunCustom)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationKind::Init => "init",
            OperationKind::AddDependency => "add-dependency",
            OperationKind::RemoveDependency => "remove-dependency",
            OperationKind::Sync => "sync",
            OperationKind::RunCustom => "run-custom",
            OperationKind::Delete => "delete",
            OperationKind::Archive => "archive",
        };
        f.write_str(s)
    }
}

/// Operational status of one project, as shown by the display layer.
///
/// `Succeeded`, `Failed` and `Cancelled` are idle states that keep the outcome
/// of the last operation visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Idle,
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl ProjectStatus {
    pub fn is_active(self) -> bool {
        matches!(self, ProjectStatus::Queued | ProjectStatus::Running)
    }

    pub fn is_idle(self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProjectStatus::Idle => "idle",
            ProjectStatus::Queued => "queued",
            ProjectStatus::Running => "running",
            ProjectStatus::Succeeded => "succeeded",
            ProjectStatus::Failed => "failed",
            ProjectStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Whether a project has a `.venv` directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenvState {
    Present,
    Missing,
}

/// Origin of one output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
    /// Lines uvdeck itself writes (command echo, step results).
    System,
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// A discovered project. Immutable; refreshed only by a registry re-scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    /// Folder name; always available even when the manifest is broken.
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_python: Option<String>,
    /// Declared dependencies: name → constraint (empty when unpinned).
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,
    pub venv: VenvState,
    /// Modification time of `pyproject.toml`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    pub discovered_at: DateTime<Utc>,
    /// Set when the manifest could not be parsed; the record is partial.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_error: Option<String>,
}

impl Project {
    pub fn has_manifest_error(&self) -> bool {
        self.manifest_error.is_some()
    }
}

/// A user intent addressed to one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    pub kind: OperationKind,
    pub project: ProjectId,
    pub args: Vec<String>,
    /// Must be set for kinds where [`OperationKind::requires_confirmation`] holds.
    pub confirmed: bool,
    /// `init` only: written to `[project].description` after scaffolding.
    pub description: Option<String>,
}

impl OperationRequest {
    pub fn new(kind: OperationKind, project: ProjectId) -> Self {
        Self {
            kind,
            project,
            args: Vec::new(),
            confirmed: false,
            description: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn confirmed(mut self, confirmed: bool) -> Self {
        self.confirmed = confirmed;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// One line (or trailing partial chunk) of operation output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

impl OutputLine {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stdout,
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stderr,
            text: text.into(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::System,
            text: text.into(),
        }
    }
}

/// Why an operation failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// The external tool could not be launched (missing from `PATH`, not executable).
    Spawn { program: String, message: String },
    /// The process exited with a nonzero code, or was killed by a signal (`code: None`).
    Exit { code: Option<i32> },
    /// An in-process step (filesystem, manifest rewrite) failed.
    Step { message: String },
    /// The worker executing the operation died unexpectedly.
    Internal { message: String },
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Spawn { program, message } => {
                write!(f, "could not launch '{program}': {message}")
            }
            FailureKind::Exit { code: Some(code) } => write!(f, "exited with code {code}"),
            FailureKind::Exit { code: None } => write!(f, "terminated by signal"),
            FailureKind::Step { message } => f.write_str(message),
            FailureKind::Internal { message } => write!(f, "internal error: {message}"),
        }
    }
}

/// Terminal classification of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed { reason: FailureKind },
    /// `forced` when the process ignored the termination signal and was killed.
    Cancelled { forced: bool },
}

impl Outcome {
    pub fn status(&self) -> ProjectStatus {
        match self {
            Outcome::Succeeded => ProjectStatus::Succeeded,
            Outcome::Failed { .. } => ProjectStatus::Failed,
            Outcome::Cancelled { .. } => ProjectStatus::Cancelled,
        }
    }
}

/// Terminal result of one operation, retained for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub kind: OperationKind,
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Exit code of the last external command run, if any.
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl OperationResult {
    pub fn status(&self) -> ProjectStatus {
        self.outcome.status()
    }

    /// Human-readable one-liner, e.g. `"sync failed: exited with code 2"`.
    pub fn summary(&self) -> String {
        match &self.outcome {
            Outcome::Succeeded => format!("{} succeeded", self.kind),
            Outcome::Failed { reason } => format!("{} failed: {reason}", self.kind),
            Outcome::Cancelled { forced: false } => format!("{} cancelled", self.kind),
            Outcome::Cancelled { forced: true } => {
                format!("{} cancelled (killed after grace period)", self.kind)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
