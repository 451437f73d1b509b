//! uvdeck engine: command execution, per-project scheduling and state.
//!
//! Front-ends talk to [`Orchestrator`]; the other modules are public for
//! embedding and tests.

mod error;
pub mod fs_ops;
pub mod log_rotation;
pub mod logging;
pub mod orchestrator;
pub mod plan;
pub mod runner;
pub mod scheduler;
pub mod state;
pub mod watcher;

pub use error::{CancelError, EngineError, Rejection, RunnerError};
pub use orchestrator::Orchestrator;
pub use runner::{CommandResult, CommandRunner, CommandSpec, RunEvent, RunHandle, RunStatus};
pub use scheduler::{ExecutionScheduler, Ticket};
pub use state::{Snapshot, StateChange, StateEvent, StateStore};
pub use watcher::{RegistryChange, WatchHandle};

/// Build a multi-thread runtime and block on `future`.
pub fn block_on<F: std::future::Future>(future: F) -> Result<F::Output, EngineError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| error::io_err("tokio-runtime", e))?;
    Ok(runtime.block_on(future))
}
