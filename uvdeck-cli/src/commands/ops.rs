//! Mutating one-shot commands: `new`, `add`, `remove`, `sync`, `run`,
//! `delete` and `archive`.
//!
//! Each submits one operation, streams its output and exits non-zero unless
//! it succeeded.

use anyhow::{Context, Result};
use clap::Args;

use uvdeck_core::Settings;
use uvdeck_engine::Rejection;

use super::{finish, follow, open, resolve};

/// Arguments for `uvdeck new`.
#[derive(Args, Debug)]
pub struct NewArgs {
    /// Folder name for the project, created under the projects root.
    pub name: String,

    /// Written to `[project].description` after `uv init`.
    #[arg(long, short = 'd')]
    pub description: Option<String>,

    /// Library to add right after creation (repeatable).
    #[arg(long = "lib", short = 'l', value_name = "PACKAGE")]
    pub libraries: Vec<String>,
}

impl NewArgs {
    pub fn run(self, settings: Settings) -> Result<()> {
        let result = uvdeck_engine::block_on(async {
            let orch = open(settings)?;
            follow(&orch, |o| {
                o.create_project(&self.name, self.description.as_deref(), &self.libraries)
            })
            .await
        })??;
        finish(result)?;
        println!("✓ Created '{}'", self.name.trim());
        Ok(())
    }
}

/// A single project argument.
#[derive(Args, Debug)]
pub struct ProjectArg {
    /// Project folder name.
    pub project: String,
}

impl ProjectArg {
    pub fn sync(self, settings: Settings) -> Result<()> {
        let result = uvdeck_engine::block_on(async {
            let orch = open(settings)?;
            let id = resolve(&orch, &self.project)?;
            follow(&orch, |o| o.sync(&id)).await
        })??;
        finish(result)
    }
}

/// Arguments for `uvdeck add`.
#[derive(Args, Debug)]
pub struct AddArgs {
    pub project: String,

    /// Requirement to add, e.g. `httpx` or `"pydantic>=2"`.
    pub package: String,

    /// Add to the development dependency group.
    #[arg(long)]
    pub dev: bool,
}

impl AddArgs {
    pub fn run(self, settings: Settings) -> Result<()> {
        let result = uvdeck_engine::block_on(async {
            let orch = open(settings)?;
            let id = resolve(&orch, &self.project)?;
            follow(&orch, |o| o.add_dependency(&id, &self.package, self.dev)).await
        })??;
        finish(result)
    }
}

/// Arguments for `uvdeck remove`.
#[derive(Args, Debug)]
pub struct RemoveArgs {
    pub project: String,
    pub package: String,
}

impl RemoveArgs {
    pub fn run(self, settings: Settings) -> Result<()> {
        let result = uvdeck_engine::block_on(async {
            let orch = open(settings)?;
            let id = resolve(&orch, &self.project)?;
            follow(&orch, |o| o.remove_dependency(&id, &self.package)).await
        })??;
        finish(result)
    }
}

/// Arguments for `uvdeck run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    pub project: String,

    /// Command line passed to `uv run`, e.g. `-- python -m pytest -q`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub command: Vec<String>,
}

impl RunArgs {
    pub fn run(self, settings: Settings) -> Result<()> {
        // Re-quote so arguments containing spaces survive the engine's split.
        let words = self.command.iter().map(String::as_str);
        let command_line = shlex::try_join(words).context("command contains a NUL byte")?;
        let result = uvdeck_engine::block_on(async {
            let orch = open(settings)?;
            let id = resolve(&orch, &self.project)?;
            follow(&orch, |o| o.run_custom(&id, &command_line)).await
        })??;
        finish(result)
    }
}

/// Arguments for `uvdeck delete` and `uvdeck archive`.
#[derive(Args, Debug)]
pub struct DestroyArgs {
    pub project: String,

    /// Confirm the operation; the project directory is removed.
    #[arg(long, short = 'y')]
    pub yes: bool,
}

impl DestroyArgs {
    pub fn delete(self, settings: Settings) -> Result<()> {
        let result = uvdeck_engine::block_on(async {
            let orch = open(settings)?;
            let id = resolve(&orch, &self.project)?;
            follow(&orch, |o| o.delete_project(&id, self.yes)).await
        })?
        .map_err(|e| self.confirm_hint("delete", e))?;
        finish(result)?;
        println!("✓ Deleted '{}'", self.project);
        Ok(())
    }

    pub fn archive(self, settings: Settings) -> Result<()> {
        let result = uvdeck_engine::block_on(async {
            let orch = open(settings)?;
            let id = resolve(&orch, &self.project)?;
            follow(&orch, |o| o.archive_project(&id, self.yes)).await
        })?
        .map_err(|e| self.confirm_hint("archive", e))?;
        finish(result)?;
        println!("✓ Archived '{}'", self.project);
        Ok(())
    }

    fn confirm_hint(&self, verb: &str, err: anyhow::Error) -> anyhow::Error {
        match err.downcast_ref::<Rejection>() {
            Some(Rejection::ConfirmationRequired { .. }) => {
                err.context(format!("re-run with --yes to {verb} '{}'", self.project))
            }
            _ => err,
        }
    }
}
