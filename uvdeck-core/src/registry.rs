//! Project discovery under the configured projects root.
//!
//! # Layout
//!
//! ```text
//! <projects_root>/
//!   weather-api/
//!     pyproject.toml     (qualifies the folder as a project)
//!     .venv/             (optional)
//!   notes/               (no manifest — ignored)
//!   _archived/           (archive output — never a project)
//! ```
//!
//! # Caching
//!
//! [`ProjectRegistry`] keeps the last scan in memory. Consumers always receive
//! clones, never references into the cache. [`ProjectRegistry::invalidate`]
//! marks one project stale; the next [`ProjectRegistry::lookup`] or
//! [`ProjectRegistry::projects`] re-reads it from disk.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use uvdeck_manifest::{has_manifest, manifest_path, read_manifest, Requirement};

use crate::error::{discovery, RegistryError};
use crate::types::{Project, ProjectId, VenvState};

/// Folder under the projects root that receives archived projects.
pub const ARCHIVE_DIR: &str = "_archived";

#[derive(Debug, Default)]
struct Cache {
    projects: BTreeMap<ProjectId, Project>,
    stale: HashSet<ProjectId>,
}

/// Scans a root directory for projects and serves copy-on-read records.
#[derive(Debug)]
pub struct ProjectRegistry {
    root: PathBuf,
    cache: RwLock<Cache>,
}

impl ProjectRegistry {
    /// Open the registry at `root`, creating the directory when it is missing.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let root = root.into();
        ensure_root(&root)?;
        let root = fs::canonicalize(&root).map_err(|e| discovery(&root, e))?;
        Ok(Self {
            root,
            cache: RwLock::new(Cache::default()),
        })
    }

    /// Canonical projects root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Identity a project named `name` has (or would have) under the root.
    pub fn id_for(&self, name: &str) -> ProjectId {
        ProjectId::from(self.root.join(name))
    }

    /// Enumerate the immediate subdirectories of the root that hold a manifest.
    ///
    /// Results are sorted by folder name. A malformed manifest produces a
    /// partial record with `manifest_error` set; it never hides the others.
    pub fn scan(&self) -> Result<Vec<Project>, RegistryError> {
        ensure_root(&self.root)?;
        let entries = fs::read_dir(&self.root).map_err(|e| discovery(&self.root, e))?;

        let mut dirs: Vec<(String, PathBuf)> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                let path = e.path();
                (is_candidate(&name) && path.is_dir()).then_some((name, path))
            })
            .collect();
        dirs.sort();

        let mut cache = self.write_cache();
        let now = Utc::now();
        let mut projects = BTreeMap::new();
        let mut ordered = Vec::new();
        for (name, path) in dirs {
            if !has_manifest(&path) {
                continue;
            }
            let id = ProjectId::from(path);
            let discovered_at = cache
                .projects
                .get(&id)
                .map(|p| p.discovered_at)
                .unwrap_or(now);
            let project = build_project(&id, name, discovered_at);
            ordered.push(project.clone());
            projects.insert(id, project);
        }

        cache.projects = projects;
        cache.stale.clear();
        Ok(ordered)
    }

    /// Cached snapshot of every known project, refreshing stale entries first.
    pub fn projects(&self) -> Vec<Project> {
        let stale: Vec<ProjectId> = self.read_cache().stale.iter().cloned().collect();
        for id in stale {
            // A vanished project is simply dropped from the snapshot.
            let _ = self.reload(&id);
        }
        self.read_cache().projects.values().cloned().collect()
    }

    /// Fetch one project by identity.
    pub fn lookup(&self, id: &ProjectId) -> Result<Project, RegistryError> {
        {
            let cache = self.read_cache();
            if !cache.stale.contains(id) {
                if let Some(project) = cache.projects.get(id) {
                    return Ok(project.clone());
                }
            }
        }
        self.reload(id)
    }

    /// Fetch one project by folder name.
    pub fn find(&self, name: &str) -> Result<Project, RegistryError> {
        self.lookup(&self.id_for(name))
    }

    /// Force a re-read of this project's metadata on next access.
    pub fn invalidate(&self, id: &ProjectId) {
        self.write_cache().stale.insert(id.clone());
    }

    fn reload(&self, id: &ProjectId) -> Result<Project, RegistryError> {
        let path = id.path();
        let is_direct_child = path.parent() == Some(self.root.as_path());
        let mut cache = self.write_cache();
        cache.stale.remove(id);

        if !is_direct_child || !path.is_dir() || !has_manifest(path) {
            cache.projects.remove(id);
            return Err(RegistryError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let discovered_at = cache
            .projects
            .get(id)
            .map(|p| p.discovered_at)
            .unwrap_or_else(Utc::now);
        let project = build_project(id, id.folder_name(), discovered_at);
        cache.projects.insert(id.clone(), project.clone());
        Ok(project)
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, Cache> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, Cache> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn ensure_root(root: &Path) -> Result<(), RegistryError> {
    if !root.exists() {
        fs::create_dir_all(root).map_err(|e| discovery(root, e))?;
    }
    Ok(())
}

fn is_candidate(name: &str) -> bool {
    !name.starts_with('.') && name != ARCHIVE_DIR
}

fn build_project(id: &ProjectId, name: String, discovered_at: DateTime<Utc>) -> Project {
    let dir = id.path();
    let venv = if dir.join(".venv").is_dir() {
        VenvState::Present
    } else {
        VenvState::Missing
    };
    let last_modified = fs::metadata(manifest_path(dir))
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from);

    let mut project = Project {
        id: id.clone(),
        name,
        package_name: None,
        description: None,
        version: None,
        requires_python: None,
        dependencies: BTreeMap::new(),
        dev_dependencies: BTreeMap::new(),
        venv,
        last_modified,
        discovered_at,
        manifest_error: None,
    };

    match read_manifest(dir) {
        Ok(manifest) => {
            project.package_name = manifest.name;
            project.description = manifest.description;
            project.version = manifest.version;
            project.requires_python = manifest.requires_python;
            project.dependencies = dependency_map(manifest.dependencies);
            project.dev_dependencies = dependency_map(manifest.dev_dependencies);
        }
        Err(err) => project.manifest_error = Some(err.to_string()),
    }
    project
}

fn dependency_map(requirements: Vec<Requirement>) -> BTreeMap<String, String> {
    requirements
        .into_iter()
        .map(|r| (r.name, r.constraint))
        .collect()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
