//! In-process filesystem steps. Blocking; callers use `spawn_blocking`.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::Builder;

/// Directories left out of archives; recreated by `uv sync`.
const SKIPPED_IN_ARCHIVE: &[&str] = &[".venv"];

pub fn create_dir(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)
}

pub fn remove_dir(path: &Path) -> io::Result<()> {
    fs::remove_dir_all(path)
}

/// Write `<archive_root>/<name>.tar.gz` holding `source` and return its path.
///
/// An existing archive of the same name is never overwritten; a timestamp
/// suffix is added instead. The archive is written to a `.tmp` sibling first
/// and renamed into place once complete.
pub fn archive_dir(source: &Path, archive_root: &Path) -> io::Result<PathBuf> {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "source has no name"))?;
    fs::create_dir_all(archive_root)?;

    let dest = unique_destination(archive_root, &name);
    let tmp = dest.with_extension("gz.tmp");

    let result = write_archive(source, &name, &tmp).and_then(|()| fs::rename(&tmp, &dest));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result.map(|()| dest)
}

fn write_archive(source: &Path, name: &str, out: &Path) -> io::Result<()> {
    let file = File::create(out)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);

    let mut entries: Vec<_> = fs::read_dir(source)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    builder.append_dir(name, source)?;
    for entry in entries {
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if SKIPPED_IN_ARCHIVE.iter().any(|skip| *skip == file_name) {
            continue;
        }
        let archived_as = format!("{name}/{file_name}");
        if entry.file_type()?.is_dir() {
            builder.append_dir_all(&archived_as, entry.path())?;
        } else {
            builder.append_path_with_name(entry.path(), &archived_as)?;
        }
    }

    let encoder = builder.into_inner()?;
    encoder.finish()?;
    Ok(())
}

fn unique_destination(archive_root: &Path, name: &str) -> PathBuf {
    let plain = archive_root.join(format!("{name}.tar.gz"));
    if !plain.exists() {
        return plain;
    }
    let stamp = Utc::now().format("%Y%m%d-%H%M%S");
    let mut candidate = archive_root.join(format!("{name}-{stamp}.tar.gz"));
    let mut n = 1;
    while candidate.exists() {
        candidate = archive_root.join(format!("{name}-{stamp}-{n}.tar.gz"));
        n += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use tempfile::TempDir;

    fn entry_names(archive: &Path) -> Vec<String> {
        let file = File::open(archive).expect("open archive");
        let mut reader = tar::Archive::new(GzDecoder::new(file));
        reader
            .entries()
            .expect("entries")
            .map(|e| {
                e.expect("entry")
                    .path()
                    .expect("path")
                    .to_string_lossy()
                    .trim_end_matches('/')
                    .to_string()
            })
            .collect()
    }

    #[test]
    fn archive_contains_project_without_venv() {
        let tmp = TempDir::new().expect("tempdir");
        let project = tmp.path().join("svc");
        fs::create_dir_all(project.join("src")).expect("mkdir");
        fs::create_dir_all(project.join(".venv/bin")).expect("mkdir venv");
        fs::write(project.join("pyproject.toml"), "[project]\nname = \"svc\"\n").expect("write");
        fs::write(project.join("src/main.py"), "print('hi')\n").expect("write");

        let dest = archive_dir(&project, &tmp.path().join("_archived")).expect("archive");
        assert_eq!(dest, tmp.path().join("_archived/svc.tar.gz"));
        assert!(!dest.with_extension("gz.tmp").exists());

        let names = entry_names(&dest);
        assert!(names.contains(&"svc/pyproject.toml".to_string()), "{names:?}");
        assert!(names.contains(&"svc/src/main.py".to_string()), "{names:?}");
        assert!(!names.iter().any(|n| n.contains(".venv")), "{names:?}");
        assert!(project.exists(), "archiving alone must not remove the source");
    }

    #[test]
    fn existing_archive_is_not_overwritten() {
        let tmp = TempDir::new().expect("tempdir");
        let project = tmp.path().join("svc");
        fs::create_dir_all(&project).expect("mkdir");
        fs::write(project.join("pyproject.toml"), "").expect("write");
        let root = tmp.path().join("_archived");

        let first = archive_dir(&project, &root).expect("first");
        let second = archive_dir(&project, &root).expect("second");
        assert_ne!(first, second);
        assert!(first.exists() && second.exists());
    }

    #[test]
    fn missing_source_is_an_error() {
        let tmp = TempDir::new().expect("tempdir");
        let err = archive_dir(&tmp.path().join("nope"), &tmp.path().join("_archived")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
