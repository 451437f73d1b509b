//! Error types for uvdeck-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from project discovery.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The projects root could not be created or read. Fatal to the scan only.
    #[error("cannot read projects root {path}: {source}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No project with a manifest lives at this path.
    #[error("project not found: {path}")]
    NotFound { path: PathBuf },
}

/// Errors from configuration loading and saving.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load — includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

pub(crate) fn config_io(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn discovery(path: impl Into<PathBuf>, source: std::io::Error) -> RegistryError {
    RegistryError::Discovery {
        path: path.into(),
        source,
    }
}
