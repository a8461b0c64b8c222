//! Filesystem utilities for docship.

use std::io::Write;
use std::path::Path;
use std::time::SystemTime;

use crate::error::UtilError;

fn io_error(path: &Path, source: std::io::Error) -> UtilError {
    UtilError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Create a directory and all parent directories if they do not exist.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> Result<(), UtilError> {
    std::fs::create_dir_all(path).map_err(|source| io_error(path, source))
}

/// Remove a directory and all its contents. No error if the directory is absent.
///
/// # Errors
/// Returns an error if the directory exists but cannot be removed.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<(), UtilError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(io_error(path, source)),
    }
}

/// Remove a file or symlink. No error if it is absent.
///
/// A symlink is removed itself; its target is never touched.
///
/// # Errors
/// Returns an error if the entry exists but cannot be removed.
pub fn remove_file_if_exists(path: &Path) -> Result<(), UtilError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(io_error(path, source)),
    }
}

/// Rename `from` to `to` as a single directory-entry operation.
///
/// # Errors
/// Returns an error (reported against `to`) if the rename fails, e.g. when the
/// two paths are on different filesystems.
pub fn rename(from: &Path, to: &Path) -> Result<(), UtilError> {
    std::fs::rename(from, to).map_err(|source| io_error(to, source))
}

/// Whether `path` itself is a symbolic link (without following it).
pub fn is_symlink(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok_and(|meta| meta.file_type().is_symlink())
}

/// Last-modified time of `path`, following symlinks.
///
/// # Errors
/// Returns an error if the metadata cannot be read.
pub fn modified_time(path: &Path) -> Result<SystemTime, UtilError> {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|source| io_error(path, source))
}

/// Write `content` to `path` atomically.
///
/// Writes a temp file in the same directory and persists it over `path`, so
/// readers never see a partially written file.
///
/// # Errors
/// Returns an error if the temp file cannot be written or renamed.
pub fn write_atomic(path: &Path, content: &str) -> Result<(), UtilError> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    ensure_dir(parent)?;
    let mut tmp =
        tempfile::NamedTempFile::new_in(parent).map_err(|source| io_error(parent, source))?;
    tmp.write_all(content.as_bytes())
        .map_err(|source| io_error(tmp.path(), source))?;
    tmp.persist(path).map_err(|e| io_error(path, e.error))?;
    Ok(())
}

/// Create a symbolic link at `link` pointing to `target`.
///
/// On Windows the link is always a directory link.
///
/// # Errors
/// Returns an error (reported against `link`) if the link cannot be created.
pub fn symlink(target: &Path, link: &Path) -> Result<(), UtilError> {
    #[cfg(unix)]
    let result = std::os::unix::fs::symlink(target, link);
    #[cfg(windows)]
    let result = std::os::windows::fs::symlink_dir(target, link);
    result.map_err(|source| io_error(link, source))
}

/// Recursively copy the directory `from` to `to`, which must not exist yet.
///
/// Symlinks are recreated as links, never followed.
///
/// # Errors
/// Returns an error if any entry cannot be read or written. A partial copy
/// may be left at `to`.
pub fn copy_dir_all(from: &Path, to: &Path) -> Result<(), UtilError> {
    std::fs::create_dir(to).map_err(|source| io_error(to, source))?;
    let entries = std::fs::read_dir(from).map_err(|source| io_error(from, source))?;
    for entry in entries {
        let entry = entry.map_err(|source| io_error(from, source))?;
        let src = entry.path();
        let dest = to.join(entry.file_name());
        let file_type = entry.file_type().map_err(|source| io_error(&src, source))?;
        if file_type.is_dir() {
            copy_dir_all(&src, &dest)?;
        } else if file_type.is_symlink() {
            let target = std::fs::read_link(&src).map_err(|source| io_error(&src, source))?;
            symlink(&target, &dest)?;
        } else {
            std::fs::copy(&src, &dest).map_err(|source| io_error(&dest, source))?;
        }
    }
    Ok(())
}
