//! uvdeck core library — domain types, project discovery, settings.
//!
//! - [`types`] — identities, requests, statuses and results
//! - [`registry`] — [`ProjectRegistry`] scans the projects root
//! - [`config`] — [`Settings`] resolved from overrides, `config.yaml` and defaults
//! - [`error`] — [`RegistryError`], [`ConfigError`]

pub mod config;
pub mod error;
pub mod registry;
pub mod types;

pub use config::{Overrides, RootSource, Settings};
pub use error::{ConfigError, RegistryError};
pub use registry::{ProjectRegistry, ARCHIVE_DIR};
pub use types::{
    FailureKind, OperationKind, OperationRequest, OperationResult, Outcome, OutputLine,
    OutputStream, Project, ProjectId, ProjectStatus, VenvState,
};
