//! Per-build temporary workspaces under `<root>/<project>/`.

use std::path::{Path, PathBuf};

use docship_util::error::UtilError;
use tempfile::TempDir;
use tracing::debug;

/// A uniquely named directory owned by one build attempt.
///
/// The directory is deleted when the workspace is dropped, so every early
/// return of the pipeline cleans up. Use [`Workspace::close`] to observe
/// removal errors.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a fresh workspace for `project` below `root`.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn create(root: &Path, project: &str) -> Result<Self, UtilError> {
        let parent = root.join(project);
        docship_util::fs::ensure_dir(&parent)?;
        let dir = tempfile::Builder::new()
            .prefix("build-")
            .tempdir_in(&parent)
            .map_err(|source| UtilError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        debug!(workspace = %dir.path().display(), "created");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the workspace and everything left in it.
    ///
    /// # Errors
    /// Returns an error if the directory exists but cannot be removed.
    pub fn close(self) -> Result<(), UtilError> {
        let path: PathBuf = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(UtilError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }
}
