//! uvdeck — manage a folder of uv-based Python projects.
//!
//! # Usage
//!
//! ```text
//! uvdeck [--root <dir>] [--tool <program>] <command>
//!
//! uvdeck list [--json]
//! uvdeck show <project> [--json]
//! uvdeck deps <project> [--json]
//! uvdeck new <name> [--description <text>] [--lib <package>]...
//! uvdeck add <project> <package> [--dev]
//! uvdeck remove <project> <package>
//! uvdeck sync <project>
//! uvdeck run <project> -- <command line>
//! uvdeck delete <project> --yes
//! uvdeck archive <project> --yes
//! uvdeck shell
//! uvdeck config show|set-root <dir>
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::{
    config::ConfigCommand,
    ops::{AddArgs, DestroyArgs, NewArgs, ProjectArg, RemoveArgs, RunArgs},
    query::{DepsArgs, ListArgs, ShowArgs},
};
use uvdeck_core::config::{self, Overrides, Settings};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "uvdeck",
    version,
    about = "Browse and operate on a folder of uv-managed Python projects",
    long_about = None,
)]
struct Cli {
    /// Projects root directory (overrides config.yaml).
    #[arg(long, global = true, env = "UVDECK_ROOT", value_name = "DIR")]
    root: Option<PathBuf>,

    /// Package-manager executable to invoke instead of `uv`.
    #[arg(long, global = true, value_name = "PROGRAM")]
    tool: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List discovered projects.
    List(ListArgs),

    /// Show one project's metadata.
    Show(ShowArgs),

    /// List packages installed in a project's virtual environment.
    Deps(DepsArgs),

    /// Create a new project with `uv init`.
    New(NewArgs),

    /// Add a dependency to a project.
    Add(AddArgs),

    /// Remove a dependency from a project.
    Remove(RemoveArgs),

    /// Install the locked dependency set into the project's `.venv`.
    Sync(ProjectArg),

    /// Run a command inside the project's environment.
    Run(RunArgs),

    /// Permanently delete a project directory.
    Delete(DestroyArgs),

    /// Pack a project into `_archived/<name>.tar.gz` and remove it.
    Archive(DestroyArgs),

    /// Interactive session: run operations on several projects at once.
    Shell,

    /// Inspect or change persisted settings.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let overrides = Overrides {
        projects_root: cli.root,
        tool: cli.tool,
    };

    match cli.command {
        Commands::Config { command } => commands::config::run(command, &overrides),
        Commands::List(args) => args.run(boot(&overrides)?),
        Commands::Show(args) => args.run(boot(&overrides)?),
        Commands::Deps(args) => args.run(boot(&overrides)?),
        Commands::New(args) => args.run(boot(&overrides)?),
        Commands::Add(args) => args.run(boot(&overrides)?),
        Commands::Remove(args) => args.run(boot(&overrides)?),
        Commands::Sync(args) => args.sync(boot(&overrides)?),
        Commands::Run(args) => args.run(boot(&overrides)?),
        Commands::Delete(args) => args.delete(boot(&overrides)?),
        Commands::Archive(args) => args.archive(boot(&overrides)?),
        Commands::Shell => commands::shell::run(boot(&overrides)?),
    }
}

/// Resolve settings and start file logging.
fn boot(overrides: &Overrides) -> Result<Settings> {
    let settings = config::load(overrides).context("failed to load uvdeck settings")?;
    let log_path =
        uvdeck_engine::logging::init(&settings.home).context("failed to initialise logging")?;
    tracing::debug!(log = %log_path.display(), "logging initialised");
    Ok(settings)
}
