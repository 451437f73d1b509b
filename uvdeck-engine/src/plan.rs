//! Translation of an [`OperationRequest`] into ordered steps.
//!
//! A plan is built at admission time, so argument problems surface as a
//! synchronous [`Rejection::InvalidRequest`] instead of a failed operation.

use std::path::{Path, PathBuf};

use uvdeck_core::{OperationKind, OperationRequest, ARCHIVE_DIR};

use crate::error::Rejection;
use crate::runner::CommandSpec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    Command(CommandSpec),
    CreateDir(PathBuf),
    SetDescription { dir: PathBuf, description: String },
    RemoveDir(PathBuf),
    /// Pack `source` into a `.tar.gz` under `archive_root`.
    Archive { source: PathBuf, archive_root: PathBuf },
}

/// What happens to the rest of the plan when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    Abort,
    /// Log the failure and carry on; the operation still ends as failed.
    Continue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub action: StepAction,
    pub on_failure: FailurePolicy,
}

impl Step {
    fn abort(action: StepAction) -> Self {
        Self {
            action,
            on_failure: FailurePolicy::Abort,
        }
    }

    fn keep_going(action: StepAction) -> Self {
        Self {
            action,
            on_failure: FailurePolicy::Continue,
        }
    }

    /// One-line description echoed into the project's output log.
    pub fn describe(&self) -> String {
        match &self.action {
            StepAction::Command(spec) => format!("$ {}", spec.display()),
            StepAction::CreateDir(path) => format!("creating {}", path.display()),
            StepAction::SetDescription { .. } => "writing project description".to_string(),
            StepAction::RemoveDir(path) => format!("removing {}", path.display()),
            StepAction::Archive { source, archive_root } => format!(
                "archiving {} into {}",
                source.display(),
                archive_root.display()
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub kind: OperationKind,
    pub steps: Vec<Step>,
}

/// Build the plan for `request`, invoking `tool` for every external step.
pub fn build(request: &OperationRequest, tool: &str) -> Result<Plan, Rejection> {
    let dir = request.project.path().to_path_buf();
    let uv = |sub: &str| CommandSpec::new(tool, &dir).arg(sub);

    let steps = match request.kind {
        OperationKind::Init => {
            let name = request.project.folder_name();
            validate_project_name(&name)?;
            let mut steps = vec![
                Step::abort(StepAction::CreateDir(dir.clone())),
                Step::abort(StepAction::Command(uv("init").args(["--name", name.as_str()]))),
            ];
            if let Some(description) = request.description.as_deref().map(str::trim) {
                if !description.is_empty() {
                    steps.push(Step::keep_going(StepAction::SetDescription {
                        dir: dir.clone(),
                        description: description.to_string(),
                    }));
                }
            }
            for library in &request.args {
                let library = library.trim();
                if library.is_empty() {
                    continue;
                }
                steps.push(Step::keep_going(StepAction::Command(uv("add").arg(library))));
            }
            steps
        }
        OperationKind::AddDependency => {
            require_package(request)?;
            vec![Step::abort(StepAction::Command(uv("add").args(request.args.iter().cloned())))]
        }
        OperationKind::RemoveDependency => {
            require_package(request)?;
            vec![Step::abort(StepAction::Command(
                uv("remove").args(request.args.iter().cloned()),
            ))]
        }
        OperationKind::Sync => vec![Step::abort(StepAction::Command(
            uv("sync").args(request.args.iter().cloned()),
        ))],
        OperationKind::RunCustom => {
            if request.args.is_empty() {
                return Err(Rejection::InvalidRequest("empty command".to_string()));
            }
            vec![Step::abort(StepAction::Command(
                uv("run").args(request.args.iter().cloned()),
            ))]
        }
        OperationKind::Delete => vec![Step::abort(StepAction::RemoveDir(dir))],
        OperationKind::Archive => {
            let archive_root = archive_root_for(&dir)?;
            vec![
                Step::abort(StepAction::Archive {
                    source: dir.clone(),
                    archive_root,
                }),
                Step::abort(StepAction::RemoveDir(dir)),
            ]
        }
    };

    Ok(Plan {
        kind: request.kind,
        steps,
    })
}

/// Folder names accepted for new projects.
pub fn validate_project_name(name: &str) -> Result<(), Rejection> {
    let invalid =
        |why: &str| Err(Rejection::InvalidRequest(format!("project name '{name}' {why}")));
    if name.trim().is_empty() {
        return invalid("is empty");
    }
    if name.starts_with('.') || name.starts_with('-') {
        return invalid("must not start with '.' or '-'");
    }
    if name == ARCHIVE_DIR {
        return invalid("is reserved");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return invalid("may only contain letters, digits, '-', '_' and '.'");
    }
    Ok(())
}

fn require_package(request: &OperationRequest) -> Result<(), Rejection> {
    match request.args.first().map(|a| a.trim()) {
        Some(pkg) if !pkg.is_empty() && !pkg.starts_with('-') => Ok(()),
        _ => Err(Rejection::InvalidRequest(format!(
            "{} needs a package name",
            request.kind
        ))),
    }
}

fn archive_root_for(dir: &Path) -> Result<PathBuf, Rejection> {
    dir.parent()
        .map(|root| root.join(ARCHIVE_DIR))
        .ok_or_else(|| Rejection::InvalidRequest(format!("{} has no parent", dir.display())))
}
