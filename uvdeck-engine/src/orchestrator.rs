//! Single entry point for front-ends.
//!
//! Wires the registry, state store, runner and scheduler together from one
//! [`Settings`] value and exposes one method per user action.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use uvdeck_core::{
    OperationKind, OperationRequest, Project, ProjectId, ProjectRegistry, ProjectStatus, Settings,
};
use uvdeck_manifest::{parse_pip_list, InstalledPackage};

use crate::error::{CancelError, EngineError, Rejection};
use crate::runner::{CommandRunner, CommandSpec, RunStatus};
use crate::scheduler::{ExecutionScheduler, Ticket};
use crate::state::{Snapshot, StateChange, StateStore};
use crate::watcher::{self, RegistryChange, WatchHandle};

pub struct Orchestrator {
    settings: Settings,
    registry: Arc<ProjectRegistry>,
    state: Arc<StateStore>,
    runner: CommandRunner,
    scheduler: ExecutionScheduler,
}

impl Orchestrator {
    /// Open the projects root (creating it when missing) and build the engine.
    pub fn new(settings: Settings) -> Result<Self, EngineError> {
        let registry = Arc::new(ProjectRegistry::open(&settings.projects_root)?);
        let state = Arc::new(StateStore::new(settings.output_cap));
        let runner = CommandRunner::new(settings.cancel_grace);
        let scheduler = ExecutionScheduler::new(
            registry.clone(),
            state.clone(),
            runner.clone(),
            settings.tool.clone(),
        );
        tracing::info!(
            root = %registry.root().display(),
            tool = %settings.tool,
            "orchestrator ready"
        );
        Ok(Self {
            settings,
            registry,
            state,
            runner,
            scheduler,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<ProjectRegistry> {
        &self.registry
    }

    pub fn scheduler(&self) -> &ExecutionScheduler {
        &self.scheduler
    }

    // -----------------------------------------------------------------------
    // Discovery
    // -----------------------------------------------------------------------

    /// Re-scan the projects root.
    pub fn refresh(&self) -> Result<Vec<Project>, EngineError> {
        Ok(self.registry.scan()?)
    }

    /// Cached projects, as of the last scan plus any invalidations since.
    pub fn projects(&self) -> Vec<Project> {
        self.registry.projects()
    }

    pub fn find(&self, name: &str) -> Result<Project, EngineError> {
        Ok(self.registry.find(name)?)
    }

    pub fn id_for(&self, name: &str) -> ProjectId {
        self.registry.id_for(name)
    }

    // -----------------------------------------------------------------------
    // Mutating operations
    // -----------------------------------------------------------------------

    /// Scaffold `<root>/<name>` with `uv init`, then add `libraries` one by one.
    pub fn create_project(
        &self,
        name: &str,
        description: Option<&str>,
        libraries: &[String],
    ) -> Result<Ticket, Rejection> {
        let name = name.trim();
        crate::plan::validate_project_name(name)?;
        let mut request = OperationRequest::new(OperationKind::Init, self.id_for(name))
            .with_args(libraries.iter().cloned());
        if let Some(description) = description {
            request = request.with_description(description);
        }
        self.scheduler.submit(request)
    }

    pub fn add_dependency(
        &self,
        project: &ProjectId,
        package: &str,
        dev: bool,
    ) -> Result<Ticket, Rejection> {
        let mut args = vec![package.trim().to_string()];
        if dev {
            args.push("--dev".to_string());
        }
        self.submit(OperationKind::AddDependency, project, args)
    }

    pub fn remove_dependency(
        &self,
        project: &ProjectId,
        package: &str,
    ) -> Result<Ticket, Rejection> {
        self.submit(
            OperationKind::RemoveDependency,
            project,
            vec![package.trim().to_string()],
        )
    }

    pub fn sync(&self, project: &ProjectId) -> Result<Ticket, Rejection> {
        self.submit(OperationKind::Sync, project, Vec::new())
    }

    /// `uv run <command_line>`, split with shell word rules.
    pub fn run_custom(&self, project: &ProjectId, command_line: &str) -> Result<Ticket, Rejection> {
        let args = shlex::split(command_line).ok_or_else(|| {
            Rejection::InvalidRequest(format!("cannot parse command line: {command_line}"))
        })?;
        self.submit(OperationKind::RunCustom, project, args)
    }

    pub fn delete_project(
        &self,
        project: &ProjectId,
        confirmed: bool,
    ) -> Result<Ticket, Rejection> {
        self.scheduler.submit(
            OperationRequest::new(OperationKind::Delete, project.clone()).confirmed(confirmed),
        )
    }

    /// Pack the project into `<root>/_archived/<name>.tar.gz`, then remove it.
    pub fn archive_project(
        &self,
        project: &ProjectId,
        confirmed: bool,
    ) -> Result<Ticket, Rejection> {
        self.scheduler.submit(
            OperationRequest::new(OperationKind::Archive, project.clone()).confirmed(confirmed),
        )
    }

    pub fn cancel(&self, project: &ProjectId) -> Result<(), CancelError> {
        self.scheduler.cancel(project)
    }

    pub fn cancel_all(&self) -> usize {
        self.scheduler.cancel_all()
    }

    fn submit(
        &self,
        kind: OperationKind,
        project: &ProjectId,
        args: Vec<String>,
    ) -> Result<Ticket, Rejection> {
        self.scheduler
            .submit(OperationRequest::new(kind, project.clone()).with_args(args))
    }

    // -----------------------------------------------------------------------
    // State
    // -----------------------------------------------------------------------

    pub fn snapshot(&self, project: &ProjectId) -> Snapshot {
        self.state.snapshot(project)
    }

    pub fn status(&self, project: &ProjectId) -> ProjectStatus {
        self.state.status(project)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state.subscribe()
    }

    pub async fn wait_idle(&self, project: &ProjectId) -> Snapshot {
        self.state.wait_idle(project).await
    }

    /// Start the filesystem watcher for the projects root.
    pub fn watch(&self) -> (WatchHandle, mpsc::Receiver<RegistryChange>) {
        watcher::spawn(self.registry.clone())
    }

    // -----------------------------------------------------------------------
    // Read-only queries
    // -----------------------------------------------------------------------

    /// Packages installed in the project's `.venv`, via `uv pip list`.
    ///
    /// Empty when the project has no virtual environment yet. Not subject to
    /// admission: it may run alongside a mutating operation.
    pub async fn list_dependencies(
        &self,
        project: &ProjectId,
    ) -> Result<Vec<InstalledPackage>, EngineError> {
        self.registry.lookup(project)?;
        if !project.path().join(".venv").is_dir() {
            return Ok(Vec::new());
        }

        let spec = CommandSpec::new(&self.settings.tool, project.path()).args(["pip", "list"]);
        let result = self.runner.run_to_end(&spec).await?;
        if result.status != RunStatus::Succeeded {
            return Err(EngineError::Query {
                project: project.clone(),
                command: spec.display(),
                stderr: result.stderr.trim().to_string(),
            });
        }
        Ok(parse_pip_list(&result.stdout))
    }
}
