//! Subcommand implementations and the helpers they share.

pub mod config;
pub mod ops;
pub mod query;
pub mod shell;

use anyhow::{Context, Result};
use colored::Colorize;
use tokio::sync::broadcast::error::RecvError;

use uvdeck_core::{OperationResult, OutputLine, OutputStream, ProjectId, ProjectStatus, Settings};
use uvdeck_engine::{Orchestrator, Rejection, Snapshot, StateEvent, Ticket};

/// Build the engine for one invocation.
pub fn open(settings: Settings) -> Result<Orchestrator> {
    let root = settings.projects_root.clone();
    Orchestrator::new(settings)
        .with_context(|| format!("cannot open projects root '{}'", root.display()))
}

/// Resolve a folder name to a project id, failing if it is not a project.
pub fn resolve(orch: &Orchestrator, name: &str) -> Result<ProjectId> {
    let project = orch.find(name).with_context(|| {
        format!(
            "no project named '{name}' under {} (run `uvdeck list`)",
            orch.registry().root().display()
        )
    })?;
    Ok(project.id)
}

/// Submit one operation and stream its output until it completes.
///
/// The first Ctrl-C asks the engine to cancel; the process still waits for
/// the operation to settle so no child outlives it. If the event stream lags,
/// live printing stops and the rest is replayed from the buffered log once
/// the operation completes.
pub async fn follow<F>(orch: &Orchestrator, submit: F) -> Result<OperationResult>
where
    F: FnOnce(&Orchestrator) -> Result<Ticket, Rejection>,
{
    let mut changes = orch.subscribe();
    let ticket = submit(orch)?;
    let project = ticket.project;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let mut printed = 0usize;
    let mut lagged = false;

    let result = loop {
        tokio::select! {
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                eprintln!("{}", "cancelling…".yellow());
                if let Err(e) = orch.cancel(&project) {
                    tracing::debug!(error = %e, "cancel after interrupt");
                }
            }
            change = changes.recv() => match change {
                Ok(change) if change.project == project => match change.event {
                    StateEvent::OutputChunk(line) if !lagged => {
                        print_line(&line, None);
                        printed += 1;
                    }
                    StateEvent::Completed(result) => break Some(result),
                    _ => {}
                },
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "output stream lagged, replaying from the log");
                    lagged = true;
                }
                Err(RecvError::Closed) => break None,
            }
        }
    };

    let snapshot = orch.snapshot(&project);
    if lagged {
        let (lost, rest) = unseen(&snapshot, printed);
        if lost > 0 {
            eprintln!("{}", format!("… {lost} lines not shown").bright_black());
        }
        for line in rest {
            print_line(line, None);
        }
    }
    result
        .or(snapshot.last_result)
        .context("operation ended without a result")
}

/// Lines of `snapshot` after the first `printed` of the operation, plus how
/// many in between were already dropped by the output cap.
fn unseen(snapshot: &Snapshot, printed: usize) -> (usize, &[OutputLine]) {
    let lost = snapshot.dropped_lines.saturating_sub(printed);
    let skip = printed.saturating_sub(snapshot.dropped_lines);
    let rest = snapshot.lines.get(skip..).unwrap_or_default();
    (lost, rest)
}

/// Turn a terminal result into the process outcome.
pub fn finish(result: OperationResult) -> Result<()> {
    if result.status() == ProjectStatus::Succeeded {
        Ok(())
    } else {
        anyhow::bail!("{}", result.summary())
    }
}

/// Print one output line, optionally prefixed with `[project]`.
pub fn print_line(line: &OutputLine, prefix: Option<&str>) {
    let prefix = prefix
        .map(|p| format!("{} ", format!("[{p}]").cyan()))
        .unwrap_or_default();
    match line.stream {
        OutputStream::Stdout => println!("{prefix}{}", line.text),
        OutputStream::Stderr => eprintln!("{prefix}{}", line.text),
        OutputStream::System => println!("{prefix}{}", line.text.bright_black()),
    }
}

pub fn status_marker(status: ProjectStatus) -> String {
    let label = status.to_string();
    match status {
        ProjectStatus::Idle => label.bright_black().to_string(),
        ProjectStatus::Queued => label.yellow().to_string(),
        ProjectStatus::Running => label.blue().bold().to_string(),
        ProjectStatus::Succeeded => label.green().to_string(),
        ProjectStatus::Failed => label.red().bold().to_string(),
        ProjectStatus::Cancelled => label.magenta().to_string(),
    }
}
