//! Writing generated files, or checking them against what is on disk.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::codec::Artifact;
use crate::error::OutputError;

/// Writes through a temporary file in the destination directory, then renames it
/// over `path`. A failed write leaves any previous file untouched.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), OutputError> {
    let io = |source| OutputError::Io { path: path.to_path_buf(), source };
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(io)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io)?;
    tmp.write_all(contents).map_err(io)?;
    tmp.as_file().sync_all().map_err(io)?;
    tmp.persist(path).map_err(|e| io(e.error))?;
    debug!(path = %path.display(), bytes = contents.len(), "written");
    Ok(())
}

/// Fails unless `path` holds exactly `expected`.
pub fn check_file(path: &Path, expected: &str, command: &str) -> Result<(), OutputError> {
    let actual = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(OutputError::Missing { path: path.to_path_buf(), command: command.to_string() })
        }
        Err(source) => return Err(OutputError::Io { path: path.to_path_buf(), source }),
    };
    if actual != expected {
        return Err(OutputError::Outdated { path: path.to_path_buf(), command: command.to_string() });
    }
    Ok(())
}

/// Writes every artifact under `dir`, or in check mode compares them.
pub fn emit_artifacts(dir: &Path, artifacts: &[Artifact], check: bool, command: &str) -> Result<Vec<PathBuf>, OutputError> {
    let mut paths = Vec::with_capacity(artifacts.len());
    for a in artifacts {
        let path = dir.join(&a.file_name);
        if check {
            check_file(&path, &a.contents, command)?;
        } else {
            write_atomic(&path, a.contents.as_bytes())?;
        }
        paths.push(path);
    }
    info!(dir = %dir.display(), files = paths.len(), check, "artifacts done");
    Ok(paths)
}
