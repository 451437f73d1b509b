//! `uvdeck config show` and `uvdeck config set-root <dir>`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

use uvdeck_core::config::{self, Overrides, RootSource};

/// Inspect or change `~/.uvdeck/config.yaml`.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective settings and where the projects root came from.
    Show(ShowArgs),

    /// Persist a new projects root.
    SetRoot(SetRootArgs),
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct SetRootArgs {
    /// Directory holding the projects. `~` is expanded when loading.
    pub dir: PathBuf,
}

#[derive(Serialize)]
struct SettingsJson {
    config_file: String,
    projects_root: String,
    root_source: RootSource,
    tool: String,
    output_cap_lines: usize,
    cancel_grace_ms: u128,
}

pub fn run(cmd: ConfigCommand, overrides: &Overrides) -> Result<()> {
    match cmd {
        ConfigCommand::Show(args) => show(args, overrides),
        ConfigCommand::SetRoot(args) => set_root(args),
    }
}

fn show(args: ShowArgs, overrides: &Overrides) -> Result<()> {
    let settings = config::load(overrides).context("failed to load uvdeck settings")?;
    let payload = SettingsJson {
        config_file: config::config_path(&settings.home).display().to_string(),
        projects_root: settings.projects_root.display().to_string(),
        root_source: settings.root_source,
        tool: settings.tool.clone(),
        output_cap_lines: settings.output_cap,
        cancel_grace_ms: settings.cancel_grace.as_millis(),
    };

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&payload).context("failed to serialize settings")?
        );
        return Ok(());
    }

    let source = match payload.root_source {
        RootSource::Override => "--root / UVDECK_ROOT",
        RootSource::ConfigFile => "config file",
        RootSource::Default => "default",
    };
    println!("config file    {}", payload.config_file);
    println!("projects root  {} ({source})", payload.projects_root);
    println!("tool           {}", payload.tool);
    println!("output cap     {} lines", payload.output_cap_lines);
    println!("cancel grace   {} ms", payload.cancel_grace_ms);
    Ok(())
}

fn set_root(args: SetRootArgs) -> Result<()> {
    let dir = if args.dir.is_relative() && !args.dir.starts_with("~") {
        std::env::current_dir()
            .context("cannot determine current directory")?
            .join(&args.dir)
    } else {
        args.dir
    };
    let path = config::set_projects_root(&dir)
        .with_context(|| format!("failed to save projects root '{}'", dir.display()))?;
    println!("✓ Projects root set to {}", dir.display());
    println!("  Saved to: {}", path.display());
    Ok(())
}
