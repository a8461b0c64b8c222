//! Running a project's build command in its checkout.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use docship_util::error::UtilError;
use docship_util::process::{run_with_timeout, Termination};
use tracing::debug;

/// How a build command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    Succeeded,
    /// Non-zero exit, or killed by a signal (`exit_code` is then `None`).
    Failed { exit_code: Option<i32> },
    /// Still running at the deadline; the whole process group was killed.
    TimedOut,
}

/// Outcome of one build command run.
#[derive(Debug)]
pub struct BuildRun {
    pub status: BuildStatus,
    /// Interleaved stdout and stderr, tail-truncated.
    pub output: String,
    pub duration: Duration,
}

/// Builder for a shell build command with a deadline.
///
/// The command string is opaque: it is handed to the platform shell as-is.
#[derive(Debug, Clone)]
pub struct BuildCommand {
    script: String,
    working_dir: PathBuf,
    timeout: Duration,
    env: Vec<(OsString, OsString)>,
}

impl BuildCommand {
    pub fn new(script: &str, working_dir: &Path) -> Self {
        Self {
            script: script.to_owned(),
            working_dir: working_dir.to_path_buf(),
            timeout: Duration::from_secs(600),
            env: Vec::new(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set an extra environment variable for the build.
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.env
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    /// Run the command to completion or until the timeout.
    ///
    /// A failing or timed-out build is reported through [`BuildStatus`], not
    /// as an error.
    ///
    /// # Errors
    /// Returns an error only if the shell cannot be started or waited on.
    pub fn run(&self) -> Result<BuildRun, UtilError> {
        let mut cmd = shell(&self.script);
        cmd.current_dir(&self.working_dir);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        debug!(command = %self.script, dir = %self.working_dir.display(), "running build");

        let bounded = run_with_timeout(&mut cmd, self.timeout)?;
        let status = match bounded.termination {
            Termination::TimedOut => BuildStatus::TimedOut,
            Termination::Exited { success: true, .. } => BuildStatus::Succeeded,
            Termination::Exited { exit_code, .. } => BuildStatus::Failed { exit_code },
        };
        Ok(BuildRun {
            status,
            output: bounded.output,
            duration: bounded.elapsed,
        })
    }
}

#[cfg(unix)]
fn shell(script: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(script);
    cmd
}

#[cfg(windows)]
fn shell(script: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(script);
    cmd
}
