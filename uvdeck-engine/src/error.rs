use std::path::PathBuf;

use thiserror::Error;
use uvdeck_core::ProjectId;

/// Error surface for engine setup, watching and read-only queries.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("registry error: {0}")]
    Registry(#[from] uvdeck_core::RegistryError),

    #[error("config error: {0}")]
    Config(#[from] uvdeck_core::ConfigError),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error("`{command}` failed for {project}: {stderr}")]
    Query {
        project: ProjectId,
        command: String,
        stderr: String,
    },

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),
}

/// Failure to launch an external command.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("could not launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' not found on PATH")]
    NotFound { program: String },
}

impl RunnerError {
    pub fn program(&self) -> &str {
        match self {
            RunnerError::Spawn { program, .. } | RunnerError::NotFound { program } => program,
        }
    }
}

/// Synchronous reasons a submission is refused. The project's state is untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("an operation is already running for {0}")]
    AlreadyRunning(ProjectId),

    #[error("unknown project: {0}")]
    UnknownProject(ProjectId),

    #[error("{kind} of {project} requires confirmation")]
    ConfirmationRequired {
        kind: uvdeck_core::OperationKind,
        project: ProjectId,
    },

    #[error("a directory already exists at {0}")]
    ProjectExists(ProjectId),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CancelError {
    #[error("no operation is running for {0}")]
    NotRunning(ProjectId),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> EngineError {
    EngineError::Io {
        path: path.into(),
        source,
    }
}
