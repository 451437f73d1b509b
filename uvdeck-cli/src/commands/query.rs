//! Read-only commands: `list`, `show` and `deps`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use uvdeck_core::{Project, Settings, VenvState};
use uvdeck_engine::Snapshot;
use uvdeck_manifest::InstalledPackage;

use super::{open, resolve, status_marker};

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

/// Arguments for `uvdeck list`.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct ProjectRow {
    #[tabled(rename = "project")]
    name: String,
    #[tabled(rename = "version")]
    version: String,
    #[tabled(rename = "python")]
    python: String,
    #[tabled(rename = "deps")]
    deps: String,
    #[tabled(rename = "venv")]
    venv: String,
    #[tabled(rename = "modified")]
    modified: String,
    #[tabled(rename = "description")]
    description: String,
}

#[derive(Serialize)]
struct ListJson<'a> {
    root: String,
    projects: &'a [Project],
}

impl ListArgs {
    pub fn run(self, settings: Settings) -> Result<()> {
        let orch = open(settings)?;
        let projects = orch.refresh().context("failed to scan projects root")?;
        let root = orch.registry().root().display().to_string();

        if self.json {
            let payload = ListJson {
                root,
                projects: &projects,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize project list")?
            );
            return Ok(());
        }

        println!(
            "uvdeck v{} | {} | {} projects",
            env!("CARGO_PKG_VERSION"),
            root,
            projects.len()
        );
        if projects.is_empty() {
            println!("No projects found.");
            println!("Run: uvdeck new <name>");
            return Ok(());
        }

        let broken = projects.iter().filter(|p| p.has_manifest_error()).count();
        let rows: Vec<ProjectRow> = projects.iter().map(project_row).collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");

        if broken > 0 {
            println!(
                "{} {broken} project(s) have an unreadable pyproject.toml; see `uvdeck show <name>`.",
                "!".red().bold()
            );
        }
        Ok(())
    }
}

fn project_row(project: &Project) -> ProjectRow {
    let name = if project.has_manifest_error() {
        format!("{} {}", project.name, "!".red().bold())
    } else {
        project.name.clone()
    };
    ProjectRow {
        name,
        version: dash(project.version.as_deref()),
        python: dash(project.requires_python.as_deref()),
        deps: format!(
            "{}+{}",
            project.dependencies.len(),
            project.dev_dependencies.len()
        ),
        venv: venv_marker(project.venv),
        modified: project.last_modified.map(format_age).unwrap_or_else(|| "-".into()),
        description: dash(project.description.as_deref()),
    }
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

/// Arguments for `uvdeck show`.
#[derive(Args, Debug)]
pub struct ShowArgs {
    pub project: String,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct ShowJson<'a> {
    project: &'a Project,
    state: &'a Snapshot,
}

impl ShowArgs {
    pub fn run(self, settings: Settings) -> Result<()> {
        let orch = open(settings)?;
        let id = resolve(&orch, &self.project)?;
        let project = orch.find(&self.project).context("project vanished")?;
        let state = orch.snapshot(&id);

        if self.json {
            let payload = ShowJson {
                project: &project,
                state: &state,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize project")?
            );
            return Ok(());
        }

        println!("{}", project.name.to_uppercase().bold());
        println!("  path         {}", project.id);
        println!("  status       {}", status_marker(state.status));
        if let Some(package) = &project.package_name {
            println!("  package      {package}");
        }
        println!("  version      {}", dash(project.version.as_deref()));
        println!("  python       {}", dash(project.requires_python.as_deref()));
        println!("  venv         {}", venv_marker(project.venv));
        println!("  description  {}", dash(project.description.as_deref()));
        if let Some(modified) = project.last_modified {
            println!(
                "  modified     {} ({})",
                modified.format("%Y-%m-%d %H:%M"),
                format_age(modified)
            );
        }
        if let Some(error) = &project.manifest_error {
            println!("  {}        {}", "error".red().bold(), error);
        }

        print_requirements("dependencies", &project.dependencies);
        print_requirements("dev dependencies", &project.dev_dependencies);
        Ok(())
    }
}

fn print_requirements(title: &str, deps: &std::collections::BTreeMap<String, String>) {
    if deps.is_empty() {
        return;
    }
    println!("{title}:");
    for (name, constraint) in deps {
        if constraint.is_empty() {
            println!("  - {name}");
        } else {
            println!("  - {name} {}", constraint.bright_black());
        }
    }
}

// ---------------------------------------------------------------------------
// deps
// ---------------------------------------------------------------------------

/// Arguments for `uvdeck deps`.
#[derive(Args, Debug)]
pub struct DepsArgs {
    pub project: String,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct PackageRow {
    #[tabled(rename = "package")]
    name: String,
    #[tabled(rename = "version")]
    version: String,
}

impl DepsArgs {
    pub fn run(self, settings: Settings) -> Result<()> {
        let packages: Vec<InstalledPackage> = uvdeck_engine::block_on(async {
            let orch = open(settings)?;
            let id = resolve(&orch, &self.project)?;
            orch.list_dependencies(&id)
                .await
                .with_context(|| format!("failed to list packages for '{}'", self.project))
        })??;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&packages).context("failed to serialize packages")?
            );
            return Ok(());
        }

        if packages.is_empty() {
            println!("No packages installed (run `uvdeck sync {}`).", self.project);
            return Ok(());
        }
        let rows: Vec<PackageRow> = packages
            .into_iter()
            .map(|p| PackageRow {
                name: p.name,
                version: p.version,
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

fn dash(value: Option<&str>) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or("-")
        .to_string()
}

fn venv_marker(venv: VenvState) -> String {
    match venv {
        VenvState::Present => "■".green().bold().to_string(),
        VenvState::Missing => "■".bright_black().to_string(),
    }
}

/// Human age such as `3d ago`, relative to now.
pub fn format_age(at: DateTime<Utc>) -> String {
    let secs = (Utc::now() - at).num_seconds().max(0);
    match secs {
        0..=59 => "just now".to_string(),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}
