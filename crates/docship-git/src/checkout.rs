//! Clone-and-checkout of a remote ref into a local working copy.

use std::path::{Path, PathBuf};
use std::process::Command;

use docship_util::process::{run_command, CommandOutput};
use tracing::{debug, instrument};

use crate::error::GitError;

/// Source-control operations the build pipeline relies on.
///
/// Implementations return structured outcomes; callers never parse raw
/// command output.
pub trait SourceControl {
    /// Produce a clean working copy of `remote` at `destination`.
    ///
    /// Any existing content at `destination` is removed first, so retrying
    /// into the same path is safe. When `reference` is non-empty it is checked
    /// out after cloning.
    ///
    /// # Errors
    /// Returns `GitError::Cleanup`, `GitError::Clone` or `GitError::Checkout`
    /// depending on which step failed.
    fn checkout(&self, remote: &str, destination: &Path, reference: &str)
        -> Result<(), GitError>;

    /// Working tree status of an existing working copy.
    ///
    /// # Errors
    /// Returns `GitError::Query` if the status cannot be read.
    fn status(&self, working_copy: &Path) -> Result<Status, GitError>;

    /// Tags pointing at the checked-out commit, sorted.
    ///
    /// # Errors
    /// Returns `GitError::Query` if the tags cannot be listed.
    fn head_tags(&self, working_copy: &Path) -> Result<Vec<String>, GitError>;
}

/// One changed path in a working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// Two-letter porcelain status code, e.g. `" M"` or `"??"`.
    pub code: String,
    pub path: String,
}

/// Working tree status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    pub entries: Vec<StatusEntry>,
}

impl Status {
    pub fn is_clean(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse `git status --porcelain` (v1) output.
    pub fn parse_porcelain(raw: &str) -> Self {
        let entries = raw
            .lines()
            .filter_map(|line| {
                let code = line.get(..2)?;
                let path = line.get(3..)?;
                Some(StatusEntry {
                    code: code.to_owned(),
                    path: path.to_owned(),
                })
            })
            .collect();
        Self { entries }
    }
}

/// [`SourceControl`] backed by the `git` command-line binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    binary: PathBuf,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new(Path::new("git"))
    }
}

impl GitCli {
    pub fn new(binary: &Path) -> Self {
        Self {
            binary: binary.to_path_buf(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        // Never block on a credential prompt; fail the clone instead.
        cmd.env("GIT_TERMINAL_PROMPT", "0")
            .args(["-c", "advice.detachedHead=false"]);
        cmd
    }

    fn in_working_copy(&self, working_copy: &Path) -> Command {
        let mut cmd = self.command();
        cmd.arg("-C").arg(working_copy);
        cmd
    }

    fn query(
        &self,
        working_copy: &Path,
        operation: &'static str,
        args: &[&str],
    ) -> Result<String, GitError> {
        let output = run_command(self.in_working_copy(working_copy).args(args))?;
        if !output.success {
            return Err(GitError::Query {
                operation,
                stderr: diagnostic_text(&output),
            });
        }
        Ok(output.stdout)
    }
}

impl SourceControl for GitCli {
    #[instrument(skip(self), level = "debug")]
    fn checkout(&self, remote: &str, destination: &Path, reference: &str) -> Result<(), GitError> {
        docship_util::fs::remove_dir_all_if_exists(destination)
            .map_err(|source| GitError::Cleanup { source })?;
        if let Some(parent) = destination.parent() {
            docship_util::fs::ensure_dir(parent).map_err(|source| GitError::Cleanup { source })?;
        }

        debug!("cloning");
        let output = run_command(
            self.command()
                .args(["clone", "--quiet", "--"])
                .arg(remote)
                .arg(destination),
        )?;
        if !output.success {
            return Err(GitError::Clone {
                remote: remote.to_owned(),
                stderr: diagnostic_text(&output),
            });
        }

        if reference.is_empty() {
            return Ok(());
        }
        if reference.starts_with('-') {
            return Err(GitError::Checkout {
                reference: reference.to_owned(),
                stderr: "refs must not start with a hyphen".to_owned(),
            });
        }

        debug!("checking out");
        let output = run_command(
            self.in_working_copy(destination)
                .args(["checkout", "--quiet", reference, "--"]),
        )?;
        if !output.success {
            return Err(GitError::Checkout {
                reference: reference.to_owned(),
                stderr: diagnostic_text(&output),
            });
        }
        Ok(())
    }

    fn status(&self, working_copy: &Path) -> Result<Status, GitError> {
        let raw = self.query(working_copy, "status", &["status", "--porcelain"])?;
        Ok(Status::parse_porcelain(&raw))
    }

    fn head_tags(&self, working_copy: &Path) -> Result<Vec<String>, GitError> {
        let raw = self.query(working_copy, "tag", &["tag", "--points-at", "HEAD"])?;
        let mut tags: Vec<String> = raw
            .lines()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
            .collect();
        tags.sort();
        Ok(tags)
    }
}

fn diagnostic_text(output: &CommandOutput) -> String {
    if output.stderr.trim().is_empty() {
        output.stdout.trim().to_owned()
    } else {
        output.stderr.trim().to_owned()
    }
}
