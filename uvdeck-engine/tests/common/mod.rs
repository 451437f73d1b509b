//! Shared fixtures: a temp projects root and a fake `uv` shell script.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use uvdeck_core::{ProjectId, Settings};
use uvdeck_engine::Orchestrator;

/// Stand-in for `uv`. Behaviour per subcommand:
/// - `init --name N`: writes a minimal pyproject.toml
/// - `add PKG`: appends PKG to added.txt; `broken-lib` fails with exit 1
/// - `sync`: sleeps 30 s when `.slow` exists, then creates `.venv`
/// - `run CMD...`: execs CMD
/// - `pip list`: prints a fixed two-package table
pub const FAKE_UV: &str = r#"#!/bin/sh
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
    echo "Initialized project $3"
    ;;
  add)
    if [ "$2" = "broken-lib" ]; then
      echo "error: no solution found for $2" >&2
      exit 1
    fi
    printf '%s\n' "$2" >> added.txt
    echo "+ $2"
    ;;
  remove)
    echo "- $2"
    ;;
  sync)
    if [ -f .slow ]; then
      echo "syncing slowly"
      sleep 30
    fi
    mkdir -p .venv
    echo "Resolved 3 packages"
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
  *)
    echo "unknown command: $1" >&2
    exit 2
    ;;
esac
"#;

pub struct Fixture {
    pub tmp: TempDir,
    pub root: PathBuf,
    pub orch: Orchestrator,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with(|_| {})
    }

    /// Build with settings adjusted by `tweak` (the fake tool is preset).
    pub fn with(tweak: impl FnOnce(&mut Settings)) -> Self {
        let tmp = TempDir::new().expect("tempdir");
        let tool = install_fake_uv(tmp.path());
        let mut settings = Settings::defaults_at(tmp.path());
        settings.projects_root = tmp.path().join("py");
        settings.tool = tool.display().to_string();
        settings.cancel_grace = Duration::from_millis(500);
        tweak(&mut settings);

        let orch = Orchestrator::new(settings).expect("orchestrator");
        let root = orch.registry().root().to_path_buf();
        Self { tmp, root, orch }
    }

    /// Create `<root>/<name>/pyproject.toml` and return the project id.
    pub fn project(&self, name: &str) -> ProjectId {
        let dir = self.root.join(name);
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(
            dir.join("pyproject.toml"),
            format!("[project]\nname = \"{name}\"\nversion = \"0.1.0\"\n"),
        )
        .expect("write manifest");
        self.orch.refresh().expect("scan");
        ProjectId::from(dir)
    }

    /// Make `sync` block until cancelled.
    pub fn make_slow(&self, id: &ProjectId) {
        fs::write(id.path().join(".slow"), "").expect("write .slow");
    }
}

fn install_fake_uv(dir: &Path) -> PathBuf {
    let bin = dir.join("bin");
    fs::create_dir_all(&bin).expect("mkdir bin");
    let path = bin.join("uv");
    fs::write(&path, FAKE_UV).expect("write fake uv");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
    }
    path
}

/// Wait for the project to go idle, failing the test after `secs`.
pub async fn settle(orch: &Orchestrator, id: &ProjectId, secs: u64) -> uvdeck_engine::Snapshot {
    tokio::time::timeout(Duration::from_secs(secs), orch.wait_idle(id))
        .await
        .expect("operation did not finish in time")
}

/// Poll until a slow sync has printed its marker, so a cancel hits a live process.
pub async fn until_slow(orch: &Orchestrator, id: &ProjectId) {
    for _ in 0..200 {
        let snap = orch.snapshot(id);
        if snap.lines.iter().any(|l| l.text == "syncing slowly") {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("operation never reached its slow step");
}
