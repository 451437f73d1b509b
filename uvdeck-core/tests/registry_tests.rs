//! Registry discovery and settings integration tests.
//!
//! Every test gets its own `assert_fs::TempDir` as the projects root or home.

use assert_fs::prelude::*;
use predicates::prelude::predicate;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use uvdeck_core::{
    config::{self, ConfigFile},
    Overrides, ProjectRegistry, RegistryError, RootSource, VenvState,
};

fn project(root: &assert_fs::TempDir, name: &str, manifest: &str) {
    root.child(name)
        .child("pyproject.toml")
        .write_str(manifest)
        .expect("write manifest");
}

// ---------------------------------------------------------------------------
// 1. Discovery
// ---------------------------------------------------------------------------

#[test]
fn scan_lists_only_manifest_dirs_sorted_by_name() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    project(&root, "zeta", "[project]\nname = \"zeta\"\n");
    project(&root, "alpha", "[project]\nname = \"alpha\"\n");
    root.child("notes").create_dir_all().expect("mkdir");
    root.child("README.md").write_str("hi").expect("write");

    let registry = ProjectRegistry::open(root.path()).expect("open");
    let names: Vec<String> = registry.scan().expect("scan").into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["alpha", "zeta"]);
}

#[test]
fn scan_is_idempotent_and_keeps_discovered_at() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    project(&root, "svc", "[project]\nname = \"svc\"\nversion = \"1.0\"\n");
    let registry = ProjectRegistry::open(root.path()).expect("open");

    let first = registry.scan().expect("scan");
    let second = registry.scan().expect("scan");
    assert_eq!(first, second);
}

#[test]
fn malformed_manifest_yields_partial_record_without_hiding_others() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    project(&root, "broken", "[project\nname = ");
    project(
        &root,
        "good",
        "[project]\nname = \"good\"\ndependencies = [\"requests>=2\"]\n",
    );

    let registry = ProjectRegistry::open(root.path()).expect("open");
    let projects = registry.scan().expect("scan");
    assert_eq!(projects.len(), 2);

    let broken = &projects[0];
    assert_eq!(broken.name, "broken");
    assert!(broken.has_manifest_error());
    assert!(broken.dependencies.is_empty());

    let good = &projects[1];
    assert!(!good.has_manifest_error());
    assert_eq!(good.dependencies.get("requests").map(String::as_str), Some(">=2"));
}

#[test]
fn venv_presence_is_reported() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    project(&root, "with", "[project]\nname = \"with\"\n");
    root.child("with/.venv").create_dir_all().expect("mkdir");
    project(&root, "without", "[project]\nname = \"without\"\n");

    let registry = ProjectRegistry::open(root.path()).expect("open");
    let projects = registry.scan().expect("scan");
    assert_eq!(projects[0].venv, VenvState::Present);
    assert_eq!(projects[1].venv, VenvState::Missing);
}

#[test]
fn missing_root_is_created() {
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    let root = tmp.child("dev/py");
    let registry = ProjectRegistry::open(root.path()).expect("open");
    root.assert(predicate::path::is_dir());
    assert!(registry.scan().expect("scan").is_empty());
}

#[cfg(unix)]
#[test]
fn root_that_is_a_file_is_a_discovery_error() {
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    let file = tmp.child("not-a-dir");
    file.write_str("x").expect("write");
    let err = ProjectRegistry::open(file.path().join("inner")).unwrap_err();
    assert!(matches!(err, RegistryError::Discovery { .. }), "got: {err}");
    assert!(err.to_string().contains("not-a-dir"));
}

// ---------------------------------------------------------------------------
// 2. Lookup and invalidation
// ---------------------------------------------------------------------------

#[test]
fn lookup_serves_cache_until_invalidated() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    project(&root, "svc", "[project]\nname = \"svc\"\ndescription = \"old\"\n");
    let registry = ProjectRegistry::open(root.path()).expect("open");
    registry.scan().expect("scan");
    let id = registry.id_for("svc");

    fs::write(
        id.path().join("pyproject.toml"),
        "[project]\nname = \"svc\"\ndescription = \"new\"\n",
    )
    .expect("rewrite");
    let cached = registry.lookup(&id).expect("lookup");
    assert_eq!(cached.description.as_deref(), Some("old"));

    registry.invalidate(&id);
    let fresh = registry.lookup(&id).expect("lookup");
    assert_eq!(fresh.description.as_deref(), Some("new"));
    assert_eq!(fresh.discovered_at, cached.discovered_at);
}

#[test]
fn lookup_of_removed_project_is_not_found() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    project(&root, "gone", "[project]\nname = \"gone\"\n");
    let registry = ProjectRegistry::open(root.path()).expect("open");
    registry.scan().expect("scan");
    let id = registry.id_for("gone");

    fs::remove_dir_all(id.path()).expect("rm");
    registry.invalidate(&id);
    let err = registry.lookup(&id).unwrap_err();
    assert!(matches!(err, RegistryError::NotFound { .. }), "got: {err}");
    assert!(registry.projects().is_empty());
}

#[test]
fn find_loads_uncached_project_by_name() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let registry = ProjectRegistry::open(root.path()).expect("open");
    project(&root, "late", "[project]\nname = \"late\"\n");
    let found = registry.find("late").expect("find");
    assert_eq!(found.package_name.as_deref(), Some("late"));
    assert!(matches!(registry.find("nope"), Err(RegistryError::NotFound { .. })));
}

// ---------------------------------------------------------------------------
// 3. Settings precedence
// ---------------------------------------------------------------------------

#[rstest]
#[case(Some("/from/flag"), Some("/from/file"), "/from/flag", RootSource::Override)]
#[case(None, Some("/from/file"), "/from/file", RootSource::ConfigFile)]
#[case(None, None, "DEFAULT", RootSource::Default)]
fn projects_root_precedence(
    #[case] flag: Option<&str>,
    #[case] file: Option<&str>,
    #[case] expected: &str,
    #[case] source: RootSource,
) {
    let home = assert_fs::TempDir::new().expect("tempdir");
    if let Some(file_root) = file {
        let cfg = ConfigFile {
            projects_root: Some(PathBuf::from(file_root)),
            ..ConfigFile::default()
        };
        config::save_file_at(home.path(), &cfg).expect("save");
    }
    let overrides = Overrides {
        projects_root: flag.map(PathBuf::from),
        ..Overrides::default()
    };

    let settings = config::load_at(home.path(), &overrides).expect("load");
    let expected = if expected == "DEFAULT" {
        home.path().join("dev").join("py")
    } else {
        PathBuf::from(expected)
    };
    assert_eq!(settings.projects_root, expected);
    assert_eq!(settings.root_source, source);
}

#[test]
fn set_projects_root_keeps_other_keys() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let cfg = ConfigFile {
        tool: Some("/opt/uv/bin/uv".to_string()),
        output_cap_lines: Some(50),
        ..ConfigFile::default()
    };
    config::save_file_at(home.path(), &cfg).expect("save");
    config::set_projects_root_at(home.path(), PathBuf::from("/srv/py").as_path()).expect("set");

    home.child(".uvdeck/config.yaml")
        .assert(predicate::str::contains("projects_root: /srv/py"));
    let settings = config::load_at(home.path(), &Overrides::default()).expect("load");
    assert_eq!(settings.tool, "/opt/uv/bin/uv");
    assert_eq!(settings.output_cap, 50);
}

#[test]
fn corrupt_config_is_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".uvdeck/config.yaml")
        .write_str("projects_root: [unclosed\n")
        .expect("write");
    let err = config::load_at(home.path(), &Overrides::default()).unwrap_err();
    assert!(err.to_string().contains("config.yaml"), "got: {err}");
}
