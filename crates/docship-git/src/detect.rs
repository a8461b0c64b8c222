//! Git binary detection and version parsing.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::GitError;

/// Information about a usable `git` installation.
#[derive(Debug, Clone)]
pub struct GitInfo {
    /// Binary to invoke; either a configured path or a bare name looked up on `PATH`.
    pub path: PathBuf,
    /// Parsed version (e.g. "2.43.0").
    pub version: String,
}

/// Locate `git` and determine its version.
///
/// Resolution order:
/// 1. `configured` (the `git.binary` config setting)
/// 2. `DOCSHIP_GIT` environment variable
/// 3. `git` on `PATH`
///
/// # Errors
/// Returns an error if the binary cannot be executed or its version output
/// cannot be parsed.
pub fn resolve_git(configured: Option<&Path>) -> Result<GitInfo, GitError> {
    let path = git_binary(configured);
    let version = query_version(&path)?;
    Ok(GitInfo { path, version })
}

/// The binary [`resolve_git`] would use, without running it.
pub fn git_binary(configured: Option<&Path>) -> PathBuf {
    configured
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("DOCSHIP_GIT").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("git"))
}

/// Parse the version from raw `git --version` output.
///
/// Handles formats like:
/// - `git version 2.43.0`
/// - `git version 2.39.3 (Apple Git-145)`
/// - `git version 2.45.1.windows.1`
pub fn parse_version(raw: &str) -> Option<String> {
    let token = raw
        .split_whitespace()
        .skip_while(|t| *t != "version")
        .nth(1)?;
    let numeric: Vec<&str> = token
        .split('.')
        .take_while(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
        .collect();
    if numeric.len() < 2 {
        return None;
    }
    Some(numeric.join("."))
}

fn query_version(path: &Path) -> Result<String, GitError> {
    let output = Command::new(path)
        .arg("--version")
        .output()
        .map_err(|_| GitError::NotFound {
            path: path.to_path_buf(),
        })?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() {
        return Err(GitError::VersionParse {
            output: stdout.trim().to_owned(),
        });
    }
    parse_version(&stdout).ok_or_else(|| GitError::VersionParse {
        output: stdout.trim().to_owned(),
    })
}
