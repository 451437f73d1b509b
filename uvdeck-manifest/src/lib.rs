//! `pyproject.toml` reading for `uvdeck-manifest`.
//!
//! [`read_manifest`] inspects the manifest at a project root and returns the
//! metadata uvdeck displays. Parsing is lenient: fields of an unexpected type
//! are skipped rather than rejected, so only TOML that cannot be parsed at all
//! produces [`ManifestError::Parse`].
//!
//! The crate also owns the two other text formats uvdeck consumes: PEP 508
//! requirement strings ([`parse_requirement`]) and the column output of
//! `uv pip list` ([`parse_pip_list`]).

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use toml::{Table, Value};

/// File name that marks a directory as a project.
pub const MANIFEST_FILE: &str = "pyproject.toml";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A single declared dependency, split into name and constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Requirement {
    /// Distribution name as written (e.g. `"requests"`).
    pub name: String,
    /// Extras requested in brackets (e.g. `["socks"]` for `requests[socks]`).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extras: Vec<String>,
    /// Everything after the name and extras, markers included. Empty when unpinned.
    pub constraint: String,
}

/// Metadata extracted from a project's `pyproject.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub requires_python: Option<String>,
    pub dependencies: Vec<Requirement>,
    /// `[dependency-groups].dev` followed by `[tool.uv].dev-dependencies`.
    pub dev_dependencies: Vec<Requirement>,
}

/// One row of `uv pip list` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
}

/// Errors from manifest reading.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("no pyproject.toml found in '{path}'")]
    Missing { path: PathBuf },
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// `<dir>/pyproject.toml` — pure, no I/O.
pub fn manifest_path(dir: &Path) -> PathBuf {
    dir.join(MANIFEST_FILE)
}

/// Whether `dir` qualifies as a project.
pub fn has_manifest(dir: &Path) -> bool {
    manifest_path(dir).is_file()
}

/// Read and parse the manifest of the project rooted at `dir`.
pub fn read_manifest(dir: &Path) -> Result<Manifest, ManifestError> {
    let path = manifest_path(dir);
    if !path.is_file() {
        return Err(ManifestError::Missing {
            path: dir.to_path_buf(),
        });
    }
    let text = fs::read_to_string(&path).map_err(|source| ManifestError::Io {
        path: path.clone(),
        source,
    })?;
    parse_manifest(&text).map_err(|source| ManifestError::Parse { path, source })
}

/// Parse manifest text. Only a TOML syntax error fails; missing or
/// wrongly-typed fields come back as `None` / empty.
pub fn parse_manifest(text: &str) -> Result<Manifest, toml::de::Error> {
    let doc: Table = text.parse()?;
    let project = doc.get("project").and_then(Value::as_table);
    let field = |key: &str| project.and_then(|p| p.get(key)).and_then(scalar_string);

    let dependencies = project
        .and_then(|p| p.get("dependencies"))
        .map(requirement_list)
        .unwrap_or_default();

    let mut dev_dependencies = doc
        .get("dependency-groups")
        .and_then(|groups| groups.get("dev"))
        .map(requirement_list)
        .unwrap_or_default();
    let uv_dev = doc
        .get("tool")
        .and_then(|tool| tool.get("uv"))
        .and_then(|uv| uv.get("dev-dependencies"))
        .map(requirement_list)
        .unwrap_or_default();
    for req in uv_dev {
        if !dev_dependencies.iter().any(|d| d.name == req.name) {
            dev_dependencies.push(req);
        }
    }

    Ok(Manifest {
        name: field("name"),
        version: field("version"),
        description: field("description").filter(|d| !d.trim().is_empty()),
        requires_python: field("requires-python"),
        dependencies,
        dev_dependencies,
    })
}

/// Split a PEP 508 requirement string into name, extras and constraint.
///
/// ```
/// let req = uvdeck_manifest::parse_requirement("requests[socks]>=2.31");
/// assert_eq!(req.name, "requests");
/// assert_eq!(req.extras, vec!["socks".to_string()]);
/// assert_eq!(req.constraint, ">=2.31");
/// ```
pub fn parse_requirement(raw: &str) -> Requirement {
    let trimmed = raw.trim();
    let end = trimmed
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        .unwrap_or(trimmed.len());
    let name = trimmed[..end].to_string();
    let mut rest = trimmed[end..].trim_start();

    let mut extras = Vec::new();
    if let Some(inner) = rest.strip_prefix('[') {
        if let Some(close) = inner.find(']') {
            extras = inner[..close]
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string)
                .collect();
            rest = inner[close + 1..].trim_start();
        }
    }

    Requirement {
        name,
        extras,
        constraint: rest.trim_end().to_string(),
    }
}

/// Parse the column output of `uv pip list`.
///
/// The header row (`Package  Version`) and the dashed separator below it are
/// optional; every remaining row contributes its first two columns.
pub fn parse_pip_list(text: &str) -> Vec<InstalledPackage> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();

    let mut start = 0;
    if lines
        .first()
        .is_some_and(|l| l.trim_start().to_lowercase().starts_with("package"))
    {
        start = 1;
        if lines
            .get(1)
            .is_some_and(|l| l.trim().chars().all(|c| c == '-' || c == ' '))
        {
            start = 2;
        }
    }

    lines[start..]
        .iter()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let name = parts.next()?;
            let version = parts.next()?;
            Some(InstalledPackage {
                name: name.to_string(),
                version: version.to_string(),
            })
        })
        .collect()
}

/// Return `text` with `[project].description` set to `description`.
///
/// Rewrites line-by-line so comments and layout survive. An existing
/// `description` key is replaced; otherwise the key is appended at the end of
/// the `[project]` table. Text without a `[project]` table is returned as-is.
pub fn with_description(text: &str, description: &str) -> String {
    let escaped = description.replace('\\', "\\\\").replace('"', "\\\"");
    let entry = format!("description = \"{escaped}\"");

    let mut out: Vec<String> = Vec::new();
    let mut in_project = false;
    let mut written = false;

    for line in text.lines() {
        let stripped = line.trim();
        if stripped.starts_with('[') {
            if in_project && !written {
                insert_before_trailing_blanks(&mut out, entry.clone());
                written = true;
            }
            in_project = stripped == "[project]";
            out.push(line.to_string());
            continue;
        }

        if in_project && is_key(stripped, "description") {
            out.push(entry.clone());
            written = true;
        } else {
            out.push(line.to_string());
        }
    }

    if in_project && !written {
        insert_before_trailing_blanks(&mut out, entry);
    }

    let mut result = out.join("\n");
    result.push('\n');
    result
}

/// Rewrite the manifest in `dir` with a new description.
pub fn write_description(dir: &Path, description: &str) -> Result<(), ManifestError> {
    let path = manifest_path(dir);
    let text = fs::read_to_string(&path).map_err(|source| ManifestError::Io {
        path: path.clone(),
        source,
    })?;
    let updated = with_description(&text, description);
    fs::write(&path, updated).map_err(|source| ManifestError::Io { path, source })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

fn requirement_list(value: &Value) -> Vec<Requirement> {
    let Some(entries) = value.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(s) => Some(parse_requirement(s)),
            // `{ include-group = "..." }` and other tables are not requirements.
            Value::Table(_) => None,
            other => Some(parse_requirement(&other.to_string())),
        })
        .filter(|req| !req.name.is_empty())
        .collect()
}

fn is_key(line: &str, key: &str) -> bool {
    line.strip_prefix(key)
        .map(|rest| rest.trim_start().starts_with('='))
        .unwrap_or(false)
}

fn insert_before_trailing_blanks(out: &mut Vec<String>, entry: String) {
    let mut at = out.len();
    while at > 0 && out[at - 1].trim().is_empty() {
        at -= 1;
    }
    out.insert(at, entry);
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
