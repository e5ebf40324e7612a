use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("parent directory unusable for {path}: {message}")]
    ParentDir { path: String, message: String },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Creates the directory `path` will live in when it is missing.
pub fn ensure_parent_dir(path: &Path) -> Result<(), PersistError> {
    let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) else {
        return Ok(());
    };
    let unusable = |message: String| PersistError::ParentDir {
        path: path.display().to_string(),
        message,
    };
    if dir.exists() {
        if !dir.is_dir() {
            return Err(unusable("not a directory".into()));
        }
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|err| unusable(err.to_string()))
}

/// Replaces `path` with `content` through a temp file in the same directory,
/// so readers never observe a half-written file.
pub fn write_atomically(path: &Path, content: &str) -> Result<(), PersistError> {
    ensure_parent_dir(path)?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    tmp.as_file_mut().sync_all()?;
    tmp.persist(path).map_err(|err| PersistError::Io(err.error))?;
    Ok(())
}
