//! Binary-level tests: every subcommand against a temp HOME and a fake `uv`.
#![cfg(unix)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

const FAKE_UV: &str = r#"#!/bin/sh
case "$1" in
  init)
    cat > pyproject.toml <<EOF
[project]
name = "$3"
version = "0.1.0"
description = "Add your description here"
requires-python = ">=3.12"
dependencies = []
EOF
    ;;
  add)
    printf '%s\n' "$2" >> added.txt
    echo "+ $2"
    ;;
  remove)
    echo "- $2"
    ;;
  sync)
    mkdir -p .venv
    echo "Resolved 2 packages"
    ;;
  run)
    shift
    exec "$@"
    ;;
  pip)
    echo "Package    Version"
    echo "---------- -------"
    echo "requests   2.32.3"
    echo "idna       3.7"
    ;;
esac
"#;

struct Env {
    home: TempDir,
    root: PathBuf,
    tool: PathBuf,
}

impl Env {
    fn new() -> Self {
        let home = TempDir::new().expect("home");
        let root = home.path().join("projects");
        fs::create_dir_all(&root).expect("mkdir root");
        let tool = home.path().join("fake-uv");
        fs::write(&tool, FAKE_UV).expect("write fake uv");
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).expect("chmod");
        Self { home, root, tool }
    }

    /// `uvdeck` with HOME isolated and no root/tool flags.
    fn bare(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("uvdeck"));
        cmd.env("HOME", self.home.path())
            .env("NO_COLOR", "1")
            .env_remove("UVDECK_ROOT")
            .env_remove("RUST_LOG");
        cmd
    }

    fn uvdeck(&self) -> Command {
        let mut cmd = self.bare();
        cmd.arg("--root").arg(&self.root).arg("--tool").arg(&self.tool);
        cmd
    }

    fn project(&self, name: &str, manifest: &str) -> PathBuf {
        let dir = self.root.join(name);
        fs::create_dir_all(&dir).expect("mkdir project");
        fs::write(dir.join("pyproject.toml"), manifest).expect("write manifest");
        dir
    }
}

fn manifest(name: &str) -> String {
    format!("[project]\nname = \"{name}\"\nversion = \"0.1.0\"\ndependencies = [\"httpx>=0.27\"]\n")
}

fn stdout_json(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.output().expect("run uvdeck");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).expect("json stdout")
}

fn assert_dir_gone(path: &Path) {
    assert!(!path.exists(), "{} should have been removed", path.display());
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

#[test]
fn list_reports_projects_and_flags_broken_manifests() {
    let env = Env::new();
    env.project("beta", &manifest("beta"));
    env.project("alpha", &manifest("alpha"));
    env.project("xbroken", "[project\nname = ");
    fs::create_dir_all(env.root.join("notes")).expect("plain dir");

    let json = stdout_json(env.uvdeck().args(["list", "--json"]));
    let names: Vec<&str> = json["projects"]
        .as_array()
        .expect("projects array")
        .iter()
        .map(|p| p["name"].as_str().expect("name"))
        .collect();
    assert_eq!(names, vec!["alpha", "beta", "xbroken"]);
    assert!(json["projects"][2]["manifest_error"].is_string());
    assert_eq!(json["projects"][0]["dependencies"]["httpx"], ">=0.27");

    env.uvdeck()
        .arg("list")
        .assert()
        .success()
        .stdout(contains("alpha").and(contains("unreadable pyproject.toml")));
}

#[test]
fn list_on_empty_root_suggests_new() {
    let env = Env::new();
    env.uvdeck()
        .arg("list")
        .assert()
        .success()
        .stdout(contains("No projects found."));
}

#[test]
fn unknown_project_fails_with_hint() {
    let env = Env::new();
    env.uvdeck()
        .args(["sync", "ghost"])
        .assert()
        .failure()
        .stderr(contains("no project named 'ghost'"));
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

#[test]
fn new_scaffolds_describes_and_adds_libraries() {
    let env = Env::new();
    env.uvdeck()
        .args(["new", "weather", "-d", "Forecasts", "--lib", "httpx", "--lib", "rich"])
        .assert()
        .success()
        .stdout(contains("+ httpx").and(contains("Created 'weather'")));

    let added = fs::read_to_string(env.root.join("weather/added.txt")).expect("added.txt");
    assert_eq!(added, "httpx\nrich\n");

    let json = stdout_json(env.uvdeck().args(["show", "weather", "--json"]));
    assert_eq!(json["project"]["description"], "Forecasts");
    assert_eq!(json["state"]["status"], "idle");
}

#[test]
fn new_refuses_existing_directory() {
    let env = Env::new();
    env.project("taken", &manifest("taken"));
    env.uvdeck()
        .args(["new", "taken"])
        .assert()
        .failure()
        .stderr(contains("already exists"));
}

#[test]
fn sync_then_deps_lists_installed_packages() {
    let env = Env::new();
    env.project("svc", &manifest("svc"));

    env.uvdeck()
        .args(["deps", "svc"])
        .assert()
        .success()
        .stdout(contains("No packages installed"));

    env.uvdeck()
        .args(["sync", "svc"])
        .assert()
        .success()
        .stdout(contains("Resolved 2 packages"));

    let json = stdout_json(env.uvdeck().args(["deps", "svc", "--json"]));
    assert_eq!(json[0]["name"], "requests");
    assert_eq!(json[1]["version"], "3.7");
}

#[test]
fn add_and_remove_pass_package_through() {
    let env = Env::new();
    let dir = env.project("svc", &manifest("svc"));
    env.uvdeck()
        .args(["add", "svc", "pydantic>=2"])
        .assert()
        .success()
        .stdout(contains("+ pydantic>=2"));
    assert_eq!(
        fs::read_to_string(dir.join("added.txt")).expect("added.txt"),
        "pydantic>=2\n"
    );
    env.uvdeck()
        .args(["remove", "svc", "pydantic"])
        .assert()
        .success()
        .stdout(contains("- pydantic"));
}

#[test]
fn run_streams_output_and_propagates_failure() {
    let env = Env::new();
    env.project("svc", &manifest("svc"));

    env.uvdeck()
        .args(["run", "svc", "--", "sh", "-c", "echo hello world"])
        .assert()
        .success()
        .stdout(contains("hello world"));

    env.uvdeck()
        .args(["run", "svc", "--", "sh", "-c", "echo oops >&2; exit 3"])
        .assert()
        .failure()
        .stderr(contains("oops").and(contains("exited with code 3")));
}

#[test]
fn missing_tool_is_reported_as_launch_failure() {
    let env = Env::new();
    env.project("svc", &manifest("svc"));
    env.bare()
        .arg("--root")
        .arg(&env.root)
        .args(["--tool", "/nonexistent/uv", "sync", "svc"])
        .assert()
        .failure()
        .stderr(contains("sync failed"));
}

#[test]
fn delete_needs_yes() {
    let env = Env::new();
    let dir = env.project("doomed", &manifest("doomed"));

    env.uvdeck()
        .args(["delete", "doomed"])
        .assert()
        .failure()
        .stderr(contains("re-run with --yes"));
    assert!(dir.exists());

    env.uvdeck()
        .args(["delete", "doomed", "--yes"])
        .assert()
        .success()
        .stdout(contains("Deleted 'doomed'"));
    assert_dir_gone(&dir);
}

#[test]
fn archive_writes_tarball_and_hides_it_from_list() {
    let env = Env::new();
    let dir = env.project("old", &manifest("old"));

    env.uvdeck().args(["archive", "old", "-y"]).assert().success();
    assert_dir_gone(&dir);
    assert!(env.root.join("_archived/old.tar.gz").is_file());

    let json = stdout_json(env.uvdeck().args(["list", "--json"]));
    assert!(json["projects"].as_array().expect("array").is_empty());
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[test]
fn config_set_root_persists_and_show_reports_source() {
    let env = Env::new();
    let json = stdout_json(env.bare().args(["config", "show", "--json"]));
    assert_eq!(json["root_source"], "default");
    assert_eq!(json["tool"], "uv");

    env.bare()
        .arg("config")
        .arg("set-root")
        .arg(&env.root)
        .assert()
        .success()
        .stdout(contains("Projects root set to"));

    let json = stdout_json(env.bare().args(["config", "show", "--json"]));
    assert_eq!(json["root_source"], "config_file");
    assert_eq!(json["projects_root"], env.root.display().to_string());

    let mut overridden = env.bare();
    overridden.env("UVDECK_ROOT", "/tmp/elsewhere");
    let json = stdout_json(overridden.args(["config", "show", "--json"]));
    assert_eq!(json["root_source"], "override");
}

#[test]
fn commands_write_log_file_under_home() {
    let env = Env::new();
    env.uvdeck().arg("list").assert().success();
    assert!(env.home.path().join(".uvdeck/logs/uvdeck.log").is_file());
}

// ---------------------------------------------------------------------------
// Shell
// ---------------------------------------------------------------------------

#[test]
fn shell_lists_projects_and_declined_delete_keeps_directory() {
    let env = Env::new();
    let dir = env.project("keep", &manifest("keep"));

    let mut child = env
        .uvdeck()
        .arg("shell")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn shell");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(b"list\ndelete keep\nn\nbogus\nquit\n")
        .expect("write stdin");
    let output = child.wait_with_output().expect("shell output");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("keep"), "{stdout}");
    assert!(stdout.contains("Delete 'keep' permanently?"), "{stdout}");
    assert!(dir.exists());
}
