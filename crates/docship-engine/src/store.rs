//! The shared artifact store: one directory per published tag plus a
//! `current` alias per project.
//!
//! ```text
//! <root>/
//!   .locks/<project>.lock
//!   <project>/
//!     current -> <tag>
//!     <tag>/
//! ```

use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use docship_util::error::UtilError;
use docship_util::lock::LockGuard;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::EngineError;

/// Name of the alias selecting a project's served version.
pub const CURRENT_ALIAS: &str = "current";

const LOCK_DIR: &str = ".locks";
const ALIAS_STAGING_PREFIX: &str = ".current-";
const SET_ASIDE_MARKER: &str = ".old-";
const STAGED_MARKER: &str = ".new-";

/// Versioned artifact directories for every project, rooted at the store root.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

/// A published tag directory found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub tag: String,
    pub modified: SystemTime,
}

/// Result of a successful [`ArtifactStore::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub path: PathBuf,
    /// Whether an earlier artifact for the same tag was replaced.
    pub replaced: bool,
}

impl ArtifactStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project_dir(&self, project: &str) -> PathBuf {
        self.root.join(project)
    }

    pub fn tag_dir(&self, project: &str, tag: &str) -> PathBuf {
        self.project_dir(project).join(tag)
    }

    pub fn alias_path(&self, project: &str) -> PathBuf {
        self.project_dir(project).join(CURRENT_ALIAS)
    }

    /// Lock file guarding every mutation of one project's directory.
    ///
    /// Kept outside the project directory so removing a project never
    /// deletes a lock another process is waiting on.
    pub fn lock_path(&self, project: &str) -> PathBuf {
        self.root.join(LOCK_DIR).join(format!("{project}.lock"))
    }

    /// Block until this process holds the exclusive lock for `project`.
    ///
    /// # Errors
    /// Returns `EngineError::Lock` if the lock file cannot be created or locked.
    pub fn lock(&self, project: &str) -> Result<LockGuard, EngineError> {
        LockGuard::acquire(&self.lock_path(project)).map_err(|source| EngineError::Lock {
            project: project.to_owned(),
            source,
        })
    }

    /// Whether a real directory (not a symlink) is published for `tag`.
    pub fn has_artifact(&self, project: &str, tag: &str) -> bool {
        is_real_dir(&self.tag_dir(project, tag))
    }

    /// Move a finished build output directory into place as `<project>/<tag>`.
    ///
    /// The output is first staged under a hidden name inside the project
    /// directory (renamed if possible, copied if `source` is on another
    /// filesystem), so the final step is always a same-directory rename. An
    /// existing artifact for the tag is renamed aside and only deleted once
    /// the new one is in place; if the new one cannot be moved in, the old
    /// one is restored. Callers must hold the project lock.
    ///
    /// # Errors
    /// Returns `EngineError::Publish` naming the step that failed.
    pub fn publish(
        &self,
        project: &str,
        tag: &str,
        source: &Path,
    ) -> Result<Publication, EngineError> {
        let project_dir = self.project_dir(project);
        docship_util::fs::ensure_dir(&project_dir)
            .map_err(publish_error(project, tag, "create project directory"))?;

        if !is_real_dir(source) {
            return Err(publish_error(project, tag, "locate build output")(not_found(
                source,
                "build output is not a directory",
            )));
        }

        let staged = hidden_sibling(&project_dir, tag, STAGED_MARKER);
        stage(source, &staged).map_err(publish_error(project, tag, "stage build output"))?;

        let destination = self.tag_dir(project, tag);
        let aside = hidden_sibling(&project_dir, tag, SET_ASIDE_MARKER);
        let replaced = swap_into_place(&staged, &destination, &aside, docship_util::fs::rename)
            .map_err(|(step, err)| publish_error(project, tag, step)(err))?;
        debug!(%project, %tag, replaced, "artifact in place");

        Ok(Publication {
            path: destination,
            replaced,
        })
    }

    /// Point the `current` alias of `project` at `tag`.
    ///
    /// A new link is created under a temporary name and renamed over the old
    /// alias, so readers always resolve either the old or the new target.
    /// The link target is the bare tag, relative to the project directory.
    /// Callers must hold the project lock.
    ///
    /// # Errors
    /// Returns `EngineError::Switch` if `tag` has no artifact or the alias
    /// cannot be replaced.
    pub fn set_current(&self, project: &str, tag: &str) -> Result<(), EngineError> {
        let target = self.tag_dir(project, tag);
        if !is_real_dir(&target) {
            return Err(switch_error(project, tag, "resolve artifact")(not_found(
                &target,
                "no published artifact",
            )));
        }

        let staging = self.project_dir(project).join(format!(
            "{ALIAS_STAGING_PREFIX}{}",
            Uuid::new_v4().simple()
        ));
        docship_util::fs::symlink(Path::new(tag), &staging)
            .map_err(switch_error(project, tag, "create alias"))?;

        if let Err(err) = docship_util::fs::rename(&staging, &self.alias_path(project)) {
            if let Err(cleanup) = docship_util::fs::remove_file_if_exists(&staging) {
                warn!(%project, error = %cleanup, "cannot remove staged alias");
            }
            return Err(switch_error(project, tag, "replace alias")(err));
        }
        debug!(%project, %tag, "alias switched");
        Ok(())
    }

    /// The tag the `current` alias resolves to, if it names a published
    /// artifact of this project.
    ///
    /// Both bare relative targets and absolute targets inside the project
    /// directory are understood.
    pub fn current_tag(&self, project: &str) -> Option<String> {
        let tag = self.alias_target(project)?;
        self.has_artifact(project, &tag).then_some(tag)
    }

    /// The tag named by the `current` alias, whether or not its artifact
    /// still exists.
    pub fn alias_target(&self, project: &str) -> Option<String> {
        let target = std::fs::read_link(self.alias_path(project)).ok()?;
        alias_target_tag(&self.project_dir(project), &target)
    }

    /// Remove the `current` alias. Returns `false` if there was none.
    ///
    /// A real directory named `current` is never touched.
    ///
    /// # Errors
    /// Returns an error if the alias exists but cannot be removed.
    pub fn clear_current(&self, project: &str) -> Result<bool, UtilError> {
        let alias = self.alias_path(project);
        if !docship_util::fs::is_symlink(&alias) {
            return Ok(false);
        }
        docship_util::fs::remove_file_if_exists(&alias)?;
        Ok(true)
    }

    /// Published artifacts of `project`, oldest first by modification time.
    ///
    /// Hidden entries, the alias, plain files and symlinks are skipped, as is
    /// anything whose name is not a valid tag.
    ///
    /// # Errors
    /// Returns an error if the project directory exists but cannot be read.
    pub fn published_artifacts(&self, project: &str) -> Result<Vec<StoredArtifact>, UtilError> {
        let dir = self.project_dir(project);
        let mut found = Vec::new();
        for (name, path) in list_dir(&dir)? {
            if docship_util::segment::validate_tag(&name).is_err() || !is_real_dir(&path) {
                continue;
            }
            let modified = docship_util::fs::modified_time(&path)?;
            found.push(StoredArtifact {
                tag: name,
                modified,
            });
        }
        found.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.tag.cmp(&b.tag)));
        Ok(found)
    }

    /// Delete staged aliases and set-aside artifacts left by interrupted
    /// operations. Returns how many entries were removed.
    ///
    /// Callers must hold the project lock, otherwise an in-flight publish
    /// could lose its set-aside copy.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be read or an entry cannot be
    /// removed.
    pub fn sweep_leftovers(&self, project: &str) -> Result<usize, UtilError> {
        let mut swept = 0;
        for (name, path) in list_dir(&self.project_dir(project))? {
            if name.starts_with(ALIAS_STAGING_PREFIX) {
                docship_util::fs::remove_file_if_exists(&path)?;
            } else if name.starts_with('.')
                && (name.contains(SET_ASIDE_MARKER) || name.contains(STAGED_MARKER))
            {
                docship_util::fs::remove_dir_all_if_exists(&path)?;
            } else {
                continue;
            }
            debug!(%project, entry = %name, "swept");
            swept += 1;
        }
        Ok(swept)
    }

    /// Delete the artifact directory of `tag`. Returns `false` if there was none.
    ///
    /// # Errors
    /// Returns an error if the directory exists but cannot be removed.
    pub fn remove_tag(&self, project: &str, tag: &str) -> Result<bool, UtilError> {
        let dir = self.tag_dir(project, tag);
        if std::fs::symlink_metadata(&dir).is_err() {
            return Ok(false);
        }
        docship_util::fs::remove_dir_all_if_exists(&dir)?;
        Ok(true)
    }

    /// Delete everything published for `project`, alias included.
    ///
    /// # Errors
    /// Returns an error if the project directory cannot be removed.
    pub fn remove_project(&self, project: &str) -> Result<(), UtilError> {
        docship_util::fs::remove_dir_all_if_exists(&self.project_dir(project))
    }
}

fn publish_error<'a>(
    project: &'a str,
    tag: &'a str,
    stage: &'static str,
) -> impl FnOnce(UtilError) -> EngineError + 'a {
    move |source| EngineError::Publish {
        project: project.to_owned(),
        tag: tag.to_owned(),
        stage,
        source,
    }
}

fn switch_error<'a>(
    project: &'a str,
    tag: &'a str,
    stage: &'static str,
) -> impl FnOnce(UtilError) -> EngineError + 'a {
    move |source| EngineError::Switch {
        project: project.to_owned(),
        tag: tag.to_owned(),
        stage,
        source,
    }
}

/// `.<tag><marker><uuid>` inside `project_dir`.
fn hidden_sibling(project_dir: &Path, tag: &str, marker: &str) -> PathBuf {
    project_dir.join(format!(".{tag}{marker}{}", Uuid::new_v4().simple()))
}

/// Replace `destination` with `staged`.
///
/// An existing entry is moved to `aside` first and deleted only once the new
/// one is in place; if the new one cannot be moved in, the old one is moved
/// back. Returns whether an entry was replaced, or the failed step.
fn swap_into_place(
    staged: &Path,
    destination: &Path,
    aside: &Path,
    rename: impl Fn(&Path, &Path) -> Result<(), UtilError>,
) -> Result<bool, (&'static str, UtilError)> {
    let replacing = std::fs::symlink_metadata(destination).is_ok();
    if replacing {
        if let Err(err) = rename(destination, aside) {
            discard(staged);
            return Err(("move previous artifact aside", err));
        }
    }

    if let Err(err) = rename(staged, destination) {
        discard(staged);
        if replacing {
            if let Err(restore) = rename(aside, destination) {
                warn!(
                    path = %destination.display(),
                    error = %restore,
                    "cannot restore previous artifact"
                );
            }
        }
        return Err(("move build output into place", err));
    }

    if replacing {
        // The new artifact is already served; a leftover is swept on reconcile.
        discard(aside);
    }
    Ok(replacing)
}

/// Move `source` to `staged`, copying when a rename is not possible.
fn stage(source: &Path, staged: &Path) -> Result<(), UtilError> {
    if docship_util::fs::rename(source, staged).is_ok() {
        return Ok(());
    }
    debug!(source = %source.display(), "rename failed, copying build output");
    let copied = docship_util::fs::copy_dir_all(source, staged);
    if copied.is_err() {
        discard(staged);
    }
    copied
}

fn discard(path: &Path) {
    if let Err(err) = docship_util::fs::remove_dir_all_if_exists(path) {
        warn!(path = %path.display(), error = %err, "cannot remove leftover directory");
    }
}

fn not_found(path: &Path, message: &'static str) -> UtilError {
    UtilError::Io {
        path: path.display().to_string(),
        source: io::Error::new(io::ErrorKind::NotFound, message),
    }
}

fn is_real_dir(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok_and(|meta| meta.is_dir())
}

/// Entries of `dir` with UTF-8 names. A missing directory has no entries.
fn list_dir(dir: &Path) -> Result<Vec<(String, PathBuf)>, UtilError> {
    let io_error = |source: io::Error| UtilError::Io {
        path: dir.display().to_string(),
        source,
    };
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error(e)),
    };
    let mut listed = Vec::new();
    for entry in entries {
        let entry = entry.map_err(io_error)?;
        if let Ok(name) = entry.file_name().into_string() {
            listed.push((name, entry.path()));
        }
    }
    Ok(listed)
}

fn alias_target_tag(project_dir: &Path, target: &Path) -> Option<String> {
    let name = if target.is_absolute() {
        if target.parent()? != project_dir {
            return None;
        }
        target.file_name()?
    } else {
        let mut components = target.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => name,
            _ => return None,
        }
    };
    let tag = name.to_str()?;
    docship_util::segment::validate_tag(tag).ok()?;
    Some(tag.to_owned())
}
