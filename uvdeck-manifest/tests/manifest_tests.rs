//! Manifest parsing tests for `uvdeck-manifest`.
//!
//! Each `#[case]` gets an isolated `TempDir` — no shared state.

use std::fs;

use rstest::rstest;
use tempfile::TempDir;
use uvdeck_manifest::{
    has_manifest, parse_requirement, read_manifest, write_description, ManifestError,
};

// ---------------------------------------------------------------------------
// Helper
// ---------------------------------------------------------------------------

fn make_dir() -> TempDir {
    TempDir::new().expect("tempdir")
}

fn write(dir: &TempDir, content: &str) {
    fs::write(dir.path().join("pyproject.toml"), content).expect("write fixture");
}

// ---------------------------------------------------------------------------
// Requirement strings
// ---------------------------------------------------------------------------

#[rstest]
#[case("requests", "requests", "")]
#[case("requests>=2.31", "requests", ">=2.31")]
#[case("numpy >= 1.26, <2", "numpy", ">= 1.26, <2")]
#[case("Django~=5.0", "Django", "~=5.0")]
#[case("typing_extensions==4.12.2", "typing_extensions", "==4.12.2")]
#[case("zope.interface", "zope.interface", "")]
#[case("tomli; python_version < \"3.11\"", "tomli", "; python_version < \"3.11\"")]
#[case("pkg @ https://example.com/pkg.whl", "pkg", "@ https://example.com/pkg.whl")]
fn requirement_splitting(#[case] raw: &str, #[case] name: &str, #[case] constraint: &str) {
    let req = parse_requirement(raw);
    assert_eq!(req.name, name);
    assert_eq!(req.constraint, constraint);
}

#[test]
fn requirement_extras_are_split() {
    let req = parse_requirement("uvicorn[standard, http2]>=0.30");
    assert_eq!(req.name, "uvicorn");
    assert_eq!(req.extras, vec!["standard".to_string(), "http2".to_string()]);
    assert_eq!(req.constraint, ">=0.30");
}

// ---------------------------------------------------------------------------
// Full manifests
// ---------------------------------------------------------------------------

#[test]
fn reads_project_table() {
    let dir = make_dir();
    write(
        &dir,
        r#"
[project]
name = "weather-api"
version = "0.3.1"
description = "Forecasts"
requires-python = ">=3.11"
dependencies = ["httpx>=0.27", "pydantic"]

[dependency-groups]
dev = ["pytest>=8", { include-group = "lint" }]

[tool.uv]
dev-dependencies = ["ruff", "pytest"]
"#,
    );

    let m = read_manifest(dir.path()).expect("read");
    assert_eq!(m.name.as_deref(), Some("weather-api"));
    assert_eq!(m.version.as_deref(), Some("0.3.1"));
    assert_eq!(m.description.as_deref(), Some("Forecasts"));
    assert_eq!(m.requires_python.as_deref(), Some(">=3.11"));
    assert_eq!(m.dependencies.len(), 2);
    assert_eq!(m.dependencies[0].name, "httpx");

    let dev: Vec<&str> = m.dev_dependencies.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(dev, vec!["pytest", "ruff"], "group entries first, duplicates dropped");
}

#[test]
fn missing_project_table_yields_empty_metadata() {
    let dir = make_dir();
    write(&dir, "[tool.black]\nline-length = 88\n");
    let m = read_manifest(dir.path()).expect("read");
    assert!(m.name.is_none());
    assert!(m.dependencies.is_empty());
}

#[test]
fn wrong_typed_dependencies_are_ignored() {
    let dir = make_dir();
    write(&dir, "[project]\nname = \"odd\"\ndependencies = \"requests\"\n");
    let m = read_manifest(dir.path()).expect("read");
    assert_eq!(m.name.as_deref(), Some("odd"));
    assert!(m.dependencies.is_empty());
}

#[rstest]
#[case("[project\nname = \"broken\"\n")]
#[case("[project]\nname = \n")]
#[case("[project]\ndependencies = [\"a\",\n")]
fn malformed_toml_returns_parse_error_with_path(#[case] content: &str) {
    let dir = make_dir();
    write(&dir, content);
    let err = read_manifest(dir.path()).unwrap_err();
    assert!(matches!(err, ManifestError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("pyproject.toml"), "got: {err}");
}

#[test]
fn empty_dir_has_no_manifest() {
    let dir = make_dir();
    assert!(!has_manifest(dir.path()));
    let err = read_manifest(dir.path()).unwrap_err();
    assert!(matches!(err, ManifestError::Missing { .. }));
}

#[test]
fn write_description_round_trips_through_reader() {
    let dir = make_dir();
    write(&dir, "[project]\nname = \"svc\"\nversion = \"0.1.0\"\n");
    write_description(dir.path(), "Internal service").expect("write");
    let m = read_manifest(dir.path()).expect("read");
    assert_eq!(m.description.as_deref(), Some("Internal service"));
    assert_eq!(m.version.as_deref(), Some("0.1.0"));
}
