//! Per-project operational state: status, bounded output log, last result.
//!
//! All mutation goes through [`StateStore::update`]. Every applied event is
//! re-published on a broadcast channel so display code can subscribe instead
//! of polling.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;

use uvdeck_core::{OperationKind, OperationResult, OutputLine, ProjectId, ProjectStatus};

const CHANGE_CHANNEL_CAPACITY: usize = 1024;

/// Input to [`StateStore::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEvent {
    /// Admitted; clears the previous operation's output.
    Queued(OperationKind),
    Running,
    CancelRequested,
    OutputChunk(OutputLine),
    Completed(OperationResult),
}

/// One applied event, as seen by subscribers.
#[derive(Debug, Clone)]
pub struct StateChange {
    pub project: ProjectId,
    /// Status after the event was applied.
    pub status: ProjectStatus,
    pub event: StateEvent,
}

/// Point-in-time copy of one project's state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub status: ProjectStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<OperationKind>,
    pub cancelling: bool,
    pub lines: Vec<OutputLine>,
    /// Lines discarded from the front of the log because of the cap.
    pub dropped_lines: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_result: Option<OperationResult>,
}

impl Snapshot {
    /// Output lines for display, led by a marker when lines were dropped.
    pub fn render_lines(&self) -> Vec<OutputLine> {
        let mut rendered = Vec::with_capacity(self.lines.len() + 1);
        if self.dropped_lines > 0 {
            rendered.push(OutputLine::system(format!(
                "… {} earlier lines truncated",
                self.dropped_lines
            )));
        }
        rendered.extend(self.lines.iter().cloned());
        rendered
    }
}

#[derive(Debug, Default)]
struct ProjectState {
    status: ProjectStatus,
    kind: Option<OperationKind>,
    cancelling: bool,
    lines: VecDeque<OutputLine>,
    dropped: usize,
    last_result: Option<OperationResult>,
}

impl ProjectState {
    fn apply(&mut self, event: &StateEvent, cap: usize) {
        match event {
            StateEvent::Queued(kind) => {
                self.status = ProjectStatus::Queued;
                self.kind = Some(*kind);
                self.cancelling = false;
                self.lines.clear();
                self.dropped = 0;
            }
            StateEvent::Running => self.status = ProjectStatus::Running,
            StateEvent::CancelRequested => {
                if self.status.is_active() {
                    self.cancelling = true;
                }
            }
            StateEvent::OutputChunk(line) => {
                self.lines.push_back(line.clone());
                while self.lines.len() > cap {
                    self.lines.pop_front();
                    self.dropped += 1;
                }
            }
            StateEvent::Completed(result) => {
                self.status = result.status();
                self.kind = Some(result.kind);
                self.cancelling = false;
                self.last_result = Some(result.clone());
            }
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            status: self.status,
            kind: self.kind,
            cancelling: self.cancelling,
            lines: self.lines.iter().cloned().collect(),
            dropped_lines: self.dropped,
            last_result: self.last_result.clone(),
        }
    }
}

/// Shared per-project state, keyed by [`ProjectId`].
#[derive(Debug)]
pub struct StateStore {
    cap: usize,
    projects: Mutex<HashMap<ProjectId, ProjectState>>,
    changes: broadcast::Sender<StateChange>,
}

impl StateStore {
    /// `output_cap` is clamped to at least one line.
    pub fn new(output_cap: usize) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            cap: output_cap.max(1),
            projects: Mutex::new(HashMap::new()),
            changes,
        }
    }

    pub fn output_cap(&self) -> usize {
        self.cap
    }

    /// Apply `event` to `project` and publish the change.
    pub fn update(&self, project: &ProjectId, event: StateEvent) {
        let mut projects = self.lock();
        let state = projects.entry(project.clone()).or_default();
        state.apply(&event, self.cap);
        let status = state.status;
        // Publish under the lock so subscribers observe events in apply order.
        let _ = self.changes.send(StateChange {
            project: project.clone(),
            status,
            event,
        });
    }

    /// Copy of the project's state; `Idle` with no output for unknown projects.
    pub fn snapshot(&self, project: &ProjectId) -> Snapshot {
        self.lock()
            .get(project)
            .map(ProjectState::snapshot)
            .unwrap_or_default()
    }

    pub fn status(&self, project: &ProjectId) -> ProjectStatus {
        self.lock()
            .get(project)
            .map(|s| s.status)
            .unwrap_or_default()
    }

    /// Drop all state for a project whose directory no longer exists.
    pub fn forget(&self, project: &ProjectId) {
        self.lock().remove(project);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    /// Resolve once `project` is neither queued nor running.
    pub async fn wait_idle(&self, project: &ProjectId) -> Snapshot {
        let mut rx = self.subscribe();
        loop {
            let snapshot = self.snapshot(project);
            if snapshot.status.is_idle() {
                return snapshot;
            }
            loop {
                match rx.recv().await {
                    Ok(change) if &change.project == project => break,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => break,
                    Err(broadcast::error::RecvError::Closed) => return self.snapshot(project),
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ProjectId, ProjectState>> {
        self.projects.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
