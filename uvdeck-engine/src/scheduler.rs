//! Admission and execution of operations, one at a time per project.
//!
//! # Lifecycle
//!
//! ```text
//! submit ──admit──▶ Queued ──worker──▶ Running ──exit──▶ Succeeded | Failed | Cancelled
//!                                         │
//!                                       cancel ──▶ Running (cancelling) ──exit──▶ Cancelled
//! ```
//!
//! A submission against a project that is queued or running is rejected,
//! never buffered. Projects are independent: operations on different projects
//! run in parallel.
//!
//! # Locking
//!
//! The active table lock is always taken before the [`StateStore`] lock.
//! Admission (insert + `Queued`) and completion (remove + `Completed`) each
//! happen under the table lock, so no observer sees an idle status while the
//! project is still admitted, or the reverse.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use uvdeck_core::{
    FailureKind, OperationKind, OperationRequest, OperationResult, Outcome, OutputLine,
    ProjectId, ProjectRegistry,
};

use crate::error::{CancelError, Rejection};
use crate::fs_ops;
use crate::plan::{self, FailurePolicy, Plan, StepAction};
use crate::runner::{CommandRunner, CommandSpec, RunEvent, RunStatus};
use crate::state::{StateEvent, StateStore};

/// Proof of admission returned by [`ExecutionScheduler::submit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ticket {
    pub project: ProjectId,
    pub kind: OperationKind,
    pub accepted_at: DateTime<Utc>,
}

#[derive(Debug)]
struct ActiveEntry {
    kind: OperationKind,
    cancel: CancellationToken,
}

struct Inner {
    registry: Arc<ProjectRegistry>,
    state: Arc<StateStore>,
    runner: CommandRunner,
    tool: String,
    active: Mutex<HashMap<ProjectId, ActiveEntry>>,
}

/// Cheap to clone; clones share the active table.
#[derive(Clone)]
pub struct ExecutionScheduler {
    inner: Arc<Inner>,
}

impl ExecutionScheduler {
    pub fn new(
        registry: Arc<ProjectRegistry>,
        state: Arc<StateStore>,
        runner: CommandRunner,
        tool: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                state,
                runner,
                tool: tool.into(),
                active: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Admit `request` or reject it without touching the project's state.
    ///
    /// Must be called from within a tokio runtime: an accepted operation is
    /// executed on a spawned task.
    pub fn submit(&self, request: OperationRequest) -> Result<Ticket, Rejection> {
        let project = request.project.clone();
        let kind = request.kind;
        match self.admit(request) {
            Ok((ticket, plan, cancel)) => {
                tracing::info!(project = %project, kind = %kind, "operation accepted");
                self.spawn_operation(project, plan, cancel);
                Ok(ticket)
            }
            Err(rejection) => {
                tracing::debug!(
                    project = %project,
                    kind = %kind,
                    reason = %rejection,
                    "operation rejected"
                );
                Err(rejection)
            }
        }
    }

    /// Request termination of the running operation for `project`.
    pub fn cancel(&self, project: &ProjectId) -> Result<(), CancelError> {
        let active = self.inner.lock_active();
        let entry = active
            .get(project)
            .ok_or_else(|| CancelError::NotRunning(project.clone()))?;
        entry.cancel.cancel();
        self.inner.state.update(project, StateEvent::CancelRequested);
        tracing::info!(project = %project, kind = %entry.kind, "cancel requested");
        Ok(())
    }

    /// Cancel every running operation; returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let active = self.inner.lock_active();
        for (project, entry) in active.iter() {
            entry.cancel.cancel();
            self.inner.state.update(project, StateEvent::CancelRequested);
        }
        active.len()
    }

    pub fn is_active(&self, project: &ProjectId) -> bool {
        self.inner.lock_active().contains_key(project)
    }

    /// Projects with an admitted operation, sorted by identity.
    pub fn active(&self) -> Vec<(ProjectId, OperationKind)> {
        let mut active: Vec<_> = self
            .inner
            .lock_active()
            .iter()
            .map(|(id, entry)| (id.clone(), entry.kind))
            .collect();
        active.sort_by(|a, b| a.0.cmp(&b.0));
        active
    }

    fn admit(
        &self,
        request: OperationRequest,
    ) -> Result<(Ticket, Plan, CancellationToken), Rejection> {
        let project = request.project.clone();
        if request.kind.requires_confirmation() && !request.confirmed {
            return Err(Rejection::ConfirmationRequired {
                kind: request.kind,
                project,
            });
        }

        if request.kind == OperationKind::Init {
            if project.path().parent() != Some(self.inner.registry.root()) {
                return Err(Rejection::InvalidRequest(format!(
                    "{project} is not directly under {}",
                    self.inner.registry.root().display()
                )));
            }
            if project.path().exists() {
                return Err(Rejection::ProjectExists(project));
            }
        } else if self.inner.registry.lookup(&project).is_err() {
            return Err(Rejection::UnknownProject(project));
        }

        let plan = plan::build(&request, &self.inner.tool)?;

        let mut active = self.inner.lock_active();
        if active.contains_key(&project) {
            return Err(Rejection::AlreadyRunning(project));
        }
        let cancel = CancellationToken::new();
        active.insert(
            project.clone(),
            ActiveEntry {
                kind: request.kind,
                cancel: cancel.clone(),
            },
        );
        self.inner
            .state
            .update(&project, StateEvent::Queued(request.kind));
        drop(active);

        let ticket = Ticket {
            project,
            kind: request.kind,
            accepted_at: Utc::now(),
        };
        Ok((ticket, plan, cancel))
    }

    fn spawn_operation(&self, project: ProjectId, plan: Plan, cancel: CancellationToken) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let started_at = Utc::now();
            let kind = plan.kind;
            let worker = tokio::spawn(execute(inner.clone(), project.clone(), plan, cancel));
            let (outcome, exit_code) = match worker.await {
                Ok(done) => done,
                Err(err) => {
                    tracing::error!(project = %project, error = %err, "operation worker died");
                    (
                        Outcome::Failed {
                            reason: FailureKind::Internal {
                                message: err.to_string(),
                            },
                        },
                        None,
                    )
                }
            };
            inner.finish(
                &project,
                OperationResult {
                    kind,
                    outcome,
                    exit_code,
                    started_at,
                    finished_at: Utc::now(),
                },
            );
        });
    }
}

impl Inner {
    fn lock_active(&self) -> MutexGuard<'_, HashMap<ProjectId, ActiveEntry>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, project: &ProjectId, result: OperationResult) {
        let summary = result.summary();
        let kind = result.kind;
        {
            let mut active = self.lock_active();
            active.remove(project);
            self.state
                .update(project, StateEvent::OutputChunk(OutputLine::system(summary.clone())));
            self.state.update(project, StateEvent::Completed(result));
        }
        if kind.changes_metadata() {
            self.registry.invalidate(project);
        }
        tracing::info!(project = %project, "{summary}");
    }

    fn emit(&self, project: &ProjectId, line: OutputLine) {
        self.state.update(project, StateEvent::OutputChunk(line));
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

enum StepOutcome {
    /// Finished; an optional note is echoed into the output log.
    Done(Option<String>),
    Failed(FailureKind),
    Cancelled { forced: bool },
}

async fn execute(
    inner: Arc<Inner>,
    project: ProjectId,
    plan: Plan,
    cancel: CancellationToken,
) -> (Outcome, Option<i32>) {
    inner.state.update(&project, StateEvent::Running);
    let mut exit_code = None;
    let mut first_failure: Option<FailureKind> = None;
    // Set once this plan has made the project directory itself.
    let mut created: Option<PathBuf> = None;
    let total = plan.steps.len();

    for (done, step) in plan.steps.into_iter().enumerate() {
        if cancel.is_cancelled() {
            if done > 0 {
                inner.emit(
                    &project,
                    OutputLine::system(format!("cancelled after {done} of {total} steps")),
                );
            }
            discard_created(&inner, &project, created).await;
            return (Outcome::Cancelled { forced: false }, exit_code);
        }
        inner.emit(&project, OutputLine::system(step.describe()));

        let outcome = match step.action {
            StepAction::Command(spec) => {
                run_command(&inner, &project, &spec, &cancel, &mut exit_code).await
            }
            StepAction::CreateDir(path) => {
                let target = path.clone();
                let outcome = blocking(move || fs_ops::create_dir(&path).map(|()| None)).await;
                if matches!(outcome, StepOutcome::Done(_)) {
                    created = Some(target);
                }
                outcome
            }
            StepAction::SetDescription { dir, description } => {
                blocking(move || {
                    uvdeck_manifest::write_description(&dir, &description)
                        .map(|()| None)
                        .map_err(|e| e.to_string())
                })
                .await
            }
            StepAction::RemoveDir(path) => {
                blocking(move || fs_ops::remove_dir(&path).map(|()| None)).await
            }
            StepAction::Archive {
                source,
                archive_root,
            } => {
                blocking(move || {
                    fs_ops::archive_dir(&source, &archive_root)
                        .map(|dest| Some(format!("archived to {}", dest.display())))
                })
                .await
            }
        };

        match outcome {
            StepOutcome::Done(note) => {
                if let Some(note) = note {
                    inner.emit(&project, OutputLine::system(note));
                }
            }
            StepOutcome::Cancelled { forced } => {
                discard_created(&inner, &project, created).await;
                return (Outcome::Cancelled { forced }, exit_code);
            }
            StepOutcome::Failed(reason) => {
                inner.emit(&project, OutputLine::system(format!("step failed: {reason}")));
                if step.on_failure == FailurePolicy::Abort {
                    discard_created(&inner, &project, created).await;
                    return (Outcome::Failed { reason }, exit_code);
                }
                tracing::warn!(project = %project, reason = %reason, "step failed, continuing");
                first_failure.get_or_insert(reason);
            }
        }
    }

    // A cancel that lands after the last step finished does not undo its work.
    match first_failure {
        Some(reason) => (Outcome::Failed { reason }, exit_code),
        None => (Outcome::Succeeded, exit_code),
    }
}

async fn run_command(
    inner: &Inner,
    project: &ProjectId,
    spec: &CommandSpec,
    cancel: &CancellationToken,
    exit_code: &mut Option<i32>,
) -> StepOutcome {
    let mut handle = match inner.runner.start(spec, cancel.clone()) {
        Ok(handle) => handle,
        Err(err) => {
            return StepOutcome::Failed(FailureKind::Spawn {
                program: err.program().to_string(),
                message: err.to_string(),
            })
        }
    };

    while let Some(event) = handle.next_event().await {
        match event {
            RunEvent::Output(line) => inner.emit(project, line),
            RunEvent::Exited(result) => {
                *exit_code = result.exit_code;
                return match result.status {
                    RunStatus::Succeeded => StepOutcome::Done(None),
                    RunStatus::Failed => StepOutcome::Failed(FailureKind::Exit {
                        code: result.exit_code,
                    }),
                    RunStatus::Cancelled { forced } => StepOutcome::Cancelled { forced },
                };
            }
        }
    }
    StepOutcome::Failed(FailureKind::Internal {
        message: "process supervisor stopped without reporting an exit".to_string(),
    })
}

/// Remove the directory this plan created, after an aborting failure or a
/// cancel, so the name can be used again.
async fn discard_created(inner: &Inner, project: &ProjectId, created: Option<PathBuf>) {
    let Some(dir) = created else { return };
    let shown = dir.display().to_string();
    match blocking(move || fs_ops::remove_dir(&dir).map(|()| None)).await {
        StepOutcome::Done(_) => {
            inner.emit(project, OutputLine::system(format!("removed partially created {shown}")));
        }
        StepOutcome::Failed(reason) => {
            tracing::warn!(project = %project, reason = %reason, "could not remove {shown}");
        }
        StepOutcome::Cancelled { .. } => {}
    }
}

/// Run a filesystem step off the async threads.
async fn blocking<F, E>(step: F) -> StepOutcome
where
    F: FnOnce() -> Result<Option<String>, E> + Send + 'static,
    E: ToString,
{
    let joined = tokio::task::spawn_blocking(move || step().map_err(|e| e.to_string())).await;
    match joined {
        Ok(Ok(note)) => StepOutcome::Done(note),
        Ok(Err(message)) => StepOutcome::Failed(FailureKind::Step { message }),
        Err(err) => StepOutcome::Failed(FailureKind::Internal {
            message: err.to_string(),
        }),
    }
}
