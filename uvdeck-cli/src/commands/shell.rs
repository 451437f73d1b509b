//! `uvdeck shell` — a line-oriented session over one long-lived engine.
//!
//! Operations run in the background; their output is printed as it arrives,
//! prefixed with the project name, while the prompt keeps accepting input.
//! Several projects can be busy at once, one operation each.

use std::io::Write;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast::{self, error::RecvError};

use uvdeck_core::Settings;
use uvdeck_engine::{Orchestrator, StateChange, StateEvent, Ticket};

use super::ops::{AddArgs, DestroyArgs, NewArgs, ProjectArg, RemoveArgs, RunArgs};
use super::{open, print_line, resolve, status_marker};

type Input = Lines<BufReader<Stdin>>;

/// Commands accepted at the `uvdeck>` prompt.
#[derive(Parser, Debug)]
#[command(name = "uvdeck", no_binary_name = true, disable_version_flag = true)]
struct ShellLine {
    #[command(subcommand)]
    command: ShellCommand,
}

#[derive(Subcommand, Debug)]
enum ShellCommand {
    /// Re-scan the projects root and show every project with its status.
    #[command(alias = "ls")]
    List,
    /// Show the buffered output of a project's latest operation.
    Log(ProjectArg),
    New(NewArgs),
    Add(AddArgs),
    Remove(RemoveArgs),
    Sync(ProjectArg),
    Run(RunArgs),
    Delete(DestroyArgs),
    Archive(DestroyArgs),
    /// List packages installed in a project's `.venv`.
    Deps(ProjectArg),
    /// Cancel the running operation of one project.
    Cancel(ProjectArg),
    /// Cancel every running operation.
    CancelAll,
    /// Leave the shell, cancelling whatever is still running.
    #[command(alias = "exit")]
    Quit,
}

enum Flow {
    Continue,
    Quit,
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "project")]
    name: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "operation")]
    operation: String,
    #[tabled(rename = "last result")]
    last: String,
}

pub fn run(settings: Settings) -> Result<()> {
    uvdeck_engine::block_on(session(settings))?
}

async fn session(settings: Settings) -> Result<()> {
    let orch = open(settings)?;
    let projects = orch.refresh().context("failed to scan projects root")?;
    println!(
        "uvdeck shell | {} | {} projects | type `help` for commands",
        orch.registry().root().display(),
        projects.len()
    );

    let printer = tokio::spawn(print_changes(orch.subscribe()));
    let (watch, mut on_disk) = orch.watch();
    let notices = tokio::spawn(async move {
        while let Some(change) = on_disk.recv().await {
            tracing::debug!(project = %change.project, "project changed on disk");
        }
    });

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt();
        let line = tokio::select! {
            line = input.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => {
                let n = orch.cancel_all();
                println!();
                println!("{}", format!("cancel requested for {n} operation(s)").yellow());
                continue;
            }
        };
        let Some(line) = line else { break };

        match dispatch(&orch, &line, &mut input).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(e) => eprintln!("{} {e:#}", "error:".red().bold()),
        }
    }

    let active = orch.scheduler().active();
    if !active.is_empty() {
        println!("cancelling {} running operation(s)…", active.len());
        orch.cancel_all();
        for (project, _) in &active {
            orch.wait_idle(project).await;
        }
    }
    watch.stop().await.context("failed to stop watcher")?;
    notices.abort();
    printer.abort();
    Ok(())
}

fn prompt() {
    print!("{} ", "uvdeck>".bold());
    let _ = std::io::stdout().flush();
}

async fn dispatch(orch: &Orchestrator, line: &str, input: &mut Input) -> Result<Flow> {
    let Some(words) = shlex::split(line) else {
        anyhow::bail!("unbalanced quotes");
    };
    if words.is_empty() {
        return Ok(Flow::Continue);
    }
    let parsed = match ShellLine::try_parse_from(words) {
        Ok(parsed) => parsed,
        Err(e) => {
            // Covers `help` as well as genuine usage errors.
            let _ = e.print();
            return Ok(Flow::Continue);
        }
    };

    match parsed.command {
        ShellCommand::List => list(orch)?,
        ShellCommand::Log(args) => {
            let id = resolve(orch, &args.project)?;
            let snapshot = orch.snapshot(&id);
            if snapshot.lines.is_empty() {
                println!("no output yet for '{}'", args.project);
            }
            for line in snapshot.render_lines() {
                print_line(&line, None);
            }
        }
        ShellCommand::New(args) => started(orch.create_project(
            &args.name,
            args.description.as_deref(),
            &args.libraries,
        )?),
        ShellCommand::Add(args) => {
            let id = resolve(orch, &args.project)?;
            started(orch.add_dependency(&id, &args.package, args.dev)?);
        }
        ShellCommand::Remove(args) => {
            let id = resolve(orch, &args.project)?;
            started(orch.remove_dependency(&id, &args.package)?);
        }
        ShellCommand::Sync(args) => {
            let id = resolve(orch, &args.project)?;
            started(orch.sync(&id)?);
        }
        ShellCommand::Run(args) => {
            let id = resolve(orch, &args.project)?;
            let words = args.command.iter().map(String::as_str);
            let command_line = shlex::try_join(words).context("command contains a NUL byte")?;
            started(orch.run_custom(&id, &command_line)?);
        }
        ShellCommand::Delete(args) => {
            let id = resolve(orch, &args.project)?;
            let question = format!("Delete '{}' permanently?", args.project);
            let confirmed = args.yes || confirm(input, &question).await?;
            if confirmed {
                started(orch.delete_project(&id, true)?);
            }
        }
        ShellCommand::Archive(args) => {
            let id = resolve(orch, &args.project)?;
            let question = format!("Archive and remove '{}'?", args.project);
            let confirmed = args.yes || confirm(input, &question).await?;
            if confirmed {
                started(orch.archive_project(&id, true)?);
            }
        }
        ShellCommand::Deps(args) => {
            let id = resolve(orch, &args.project)?;
            let packages = orch.list_dependencies(&id).await?;
            if packages.is_empty() {
                println!("no packages installed in '{}'", args.project);
            }
            for package in packages {
                println!("  {} {}", package.name, package.version.bright_black());
            }
        }
        ShellCommand::Cancel(args) => {
            let id = resolve(orch, &args.project)?;
            orch.cancel(&id)?;
        }
        ShellCommand::CancelAll => {
            let n = orch.cancel_all();
            println!("cancel requested for {n} operation(s)");
        }
        ShellCommand::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
}

fn started(ticket: Ticket) {
    println!(
        "{} {} started",
        format!("[{}]", ticket.project.folder_name()).cyan(),
        ticket.kind
    );
}

async fn confirm(input: &mut Input, question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    let _ = std::io::stdout().flush();
    let answer = input.next_line().await.context("failed to read stdin")?;
    Ok(matches!(
        answer.as_deref().map(str::trim),
        Some("y") | Some("Y") | Some("yes")
    ))
}

fn list(orch: &Orchestrator) -> Result<()> {
    let projects = orch.refresh().context("failed to scan projects root")?;
    if projects.is_empty() {
        println!("No projects found.");
        return Ok(());
    }
    let rows: Vec<StatusRow> = projects
        .iter()
        .map(|project| {
            let snapshot = orch.snapshot(&project.id);
            StatusRow {
                name: project.name.clone(),
                status: status_marker(snapshot.status),
                operation: snapshot.kind.map(|k| k.to_string()).unwrap_or_default(),
                last: snapshot
                    .last_result
                    .map(|r| r.summary())
                    .unwrap_or_default(),
            }
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

async fn print_changes(mut changes: broadcast::Receiver<StateChange>) {
    loop {
        match changes.recv().await {
            Ok(change) => {
                if let StateEvent::OutputChunk(line) = change.event {
                    print_line(&line, Some(change.project.folder_name().as_str()));
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                eprintln!("{}", format!("… {skipped} lines not shown").bright_black());
            }
            Err(RecvError::Closed) => break,
        }
    }
}
