//! Filesystem watching for the projects root.
//!
//! Watches the root and every project directory non-recursively. Events that
//! touch a top-level directory, a `pyproject.toml` or a `.venv` invalidate the
//! affected project in the registry and are forwarded as [`RegistryChange`],
//! debounced per project.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use uvdeck_core::{ProjectId, ProjectRegistry, ARCHIVE_DIR};
use uvdeck_manifest::MANIFEST_FILE;

use crate::error::{io_err, EngineError};

/// Minimum spacing between two notifications for the same project.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// A project whose on-disk metadata may have changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryChange {
    pub project: ProjectId,
}

/// Running watcher task. Dropping the handle also stops the task.
#[derive(Debug)]
pub struct WatchHandle {
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<Result<(), EngineError>>,
}

impl WatchHandle {
    pub async fn stop(self) -> Result<(), EngineError> {
        let _ = self.shutdown.send(());
        match self.task.await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(error = %err, "watcher task join failure");
                Ok(())
            }
        }
    }
}

/// Start watching `registry`'s root; changes arrive on the returned receiver.
pub fn spawn(
    registry: Arc<ProjectRegistry>,
) -> (WatchHandle, mpsc::Receiver<RegistryChange>) {
    let (change_tx, change_rx) = mpsc::channel(256);
    let (shutdown, _) = broadcast::channel(1);
    let shutdown_rx = shutdown.subscribe();
    let task = tokio::spawn(async move {
        let result = watcher_task(registry, change_tx, shutdown_rx).await;
        if let Err(err) = &result {
            tracing::warn!(error = %err, "project watcher stopped");
        }
        result
    });
    (WatchHandle { shutdown, task }, change_rx)
}

async fn watcher_task(
    registry: Arc<ProjectRegistry>,
    change_tx: mpsc::Sender<RegistryChange>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), EngineError> {
    let root = registry.root().to_path_buf();

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;

    let mut watched = HashSet::new();
    register_tree(&mut watcher, &mut watched, &root)?;

    let mut debounce = HashMap::<PathBuf, Instant>::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }

                for path in event.paths {
                    let Some(project) = project_for_path(&root, &path) else {
                        continue;
                    };
                    if project.path().is_dir() {
                        watch_dir(&mut watcher, &mut watched, project.path())?;
                    } else {
                        watched.remove(project.path());
                    }

                    registry.invalidate(&project);
                    if !should_process_event(&mut debounce, project.path(), Instant::now()) {
                        continue;
                    }
                    tracing::debug!(project = %project, "project changed on disk");
                    if change_tx.send(RegistryChange { project }).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    Ok(())
}

/// Map an event path to the project it concerns, if any.
///
/// Relevant paths are `<root>/<dir>` and `<root>/<dir>/{pyproject.toml,.venv}`.
pub fn project_for_path(root: &Path, path: &Path) -> Option<ProjectId> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = rel.components();
    let top = parts.next()?.as_os_str().to_string_lossy().into_owned();
    if top.starts_with('.') || top == ARCHIVE_DIR {
        return None;
    }
    match parts.next() {
        None => {}
        Some(second) => {
            let second = second.as_os_str();
            if parts.next().is_some() || (second != MANIFEST_FILE && second != ".venv") {
                return None;
            }
        }
    }
    Some(ProjectId::from(root.join(top)))
}

fn register_tree(
    watcher: &mut RecommendedWatcher,
    watched: &mut HashSet<PathBuf>,
    root: &Path,
) -> Result<(), EngineError> {
    watch_dir(watcher, watched, root)?;
    let entries = fs::read_dir(root).map_err(|e| io_err(root, e))?;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_dir() && project_for_path(root, &path).is_some() {
            watch_dir(watcher, watched, &path)?;
        }
    }
    Ok(())
}

fn watch_dir(
    watcher: &mut RecommendedWatcher,
    watched: &mut HashSet<PathBuf>,
    dir: &Path,
) -> Result<(), EngineError> {
    if watched.insert(dir.to_path_buf()) {
        match watcher.watch(dir, RecursiveMode::NonRecursive) {
            Ok(()) => tracing::debug!(path = %dir.display(), "watching directory"),
            // The directory may vanish between the event and the watch call.
            Err(err) if !dir.exists() => {
                watched.remove(dir);
                tracing::debug!(path = %dir.display(), error = %err, "directory gone before watch");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

fn should_process_event(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
) -> bool {
    should_process_event_with_threshold(debounce, path, now, DEBOUNCE_WINDOW)
}

fn should_process_event_with_threshold(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
    threshold: Duration,
) -> bool {
    debounce.retain(|_, seen_at| now.duration_since(*seen_at) <= Duration::from_secs(30));
    match debounce.get(path) {
        Some(last_seen) if now.duration_since(*last_seen) < threshold => false,
        _ => {
            debounce.insert(path.to_path_buf(), now);
            true
        }
    }
}
