//! Error types for docship-engine.

use std::fmt;
use std::time::Duration;

use docship_config::project::LedgerError;

/// The failure categories reported to callers of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The tag fails the format policy or is unknown to the project's ledger.
    InvalidTag,
    CheckoutFailed,
    /// The build command exited non-zero, could not start, or produced no output directory.
    BuildFailed,
    BuildTimeout,
    PublishFailed,
    SwitchFailed,
    /// The project does not exist.
    NotFound,
    /// The project or version already exists.
    Conflict,
    /// Registry, lock, workspace or configuration I/O failed.
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidTag => "invalid-tag",
            Self::CheckoutFailed => "checkout-failed",
            Self::BuildFailed => "build-failed",
            Self::BuildTimeout => "build-timeout",
            Self::PublishFailed => "publish-failed",
            Self::SwitchFailed => "switch-failed",
            Self::NotFound => "not-found",
            Self::Conflict => "conflict",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The tag cannot be used as a directory name.
    #[error("{source}")]
    InvalidTag {
        source: docship_util::error::UtilError,
    },

    /// The tag is unknown to the project's ledger, or is already in it.
    #[error("{0}")]
    Ledger(#[from] docship_config::project::LedgerError),

    /// No artifact directory exists for the tag.
    #[error("no published artifact for {project} {tag}")]
    MissingArtifact { project: String, tag: String },

    /// The project id is malformed.
    #[error("{source}")]
    InvalidProjectId {
        source: docship_util::error::UtilError,
    },

    #[error("project \"{project}\" not found")]
    ProjectNotFound { project: String },

    #[error("project \"{project}\" already exists")]
    ProjectExists { project: String },

    /// Clone or ref checkout failed.
    #[error("cannot check out {project} {tag}: {source}")]
    Checkout {
        project: String,
        tag: String,
        source: docship_git::GitError,
    },

    /// The build command exited with a non-zero status.
    #[error("build of {project} {tag} failed{}", exit_suffix(*.exit_code))]
    BuildFailed {
        project: String,
        tag: String,
        exit_code: Option<i32>,
        output: String,
    },

    /// The build command could not be started.
    #[error("cannot start build of {project} {tag}: {source}")]
    BuildExec {
        project: String,
        tag: String,
        source: docship_util::error::UtilError,
    },

    /// The build command exceeded its allotted time and was killed.
    #[error("build of {project} {tag} timed out after {}s", .timeout.as_secs())]
    BuildTimeout {
        project: String,
        tag: String,
        timeout: Duration,
        output: String,
    },

    /// The build succeeded but did not leave its output directory behind.
    #[error("build of {project} {tag} produced no `{output_dir}` directory")]
    MissingOutput {
        project: String,
        tag: String,
        output_dir: String,
        output: String,
    },

    /// A step of moving the build output into the artifact store failed.
    #[error("cannot publish {project} {tag}: {stage} failed")]
    Publish {
        project: String,
        tag: String,
        stage: &'static str,
        source: docship_util::error::UtilError,
    },

    /// A step of repointing the `current` alias failed.
    #[error("cannot switch {project} to {tag}: {stage} failed")]
    Switch {
        project: String,
        tag: String,
        stage: &'static str,
        source: docship_util::error::UtilError,
    },

    /// Removing published content failed.
    #[error("cannot remove {what} of {project}: {source}")]
    Remove {
        project: String,
        what: String,
        source: docship_util::error::UtilError,
    },

    /// The per-build temporary workspace could not be created.
    #[error("cannot create build workspace: {source}")]
    Workspace {
        source: docship_util::error::UtilError,
    },

    /// The per-project lock could not be acquired.
    #[error("cannot lock project \"{project}\": {source}")]
    Lock {
        project: String,
        source: docship_util::error::UtilError,
    },

    /// Reading the artifact store failed.
    #[error("{0}")]
    Util(#[from] docship_util::error::UtilError),

    #[error("{0}")]
    Registry(#[from] docship_config::registry::RegistryError),

    #[error("{0}")]
    Config(#[from] docship_config::config::ConfigError),

    /// A configuration file already exists where one would be created.
    #[error("{path} already exists")]
    ConfigExists { path: String },
}

fn exit_suffix(code: Option<i32>) -> String {
    match code {
        Some(code) => format!(" with exit code {code}"),
        None => " (terminated by signal)".to_owned(),
    }
}

impl EngineError {
    /// The failure category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidTag { .. }
            | Self::MissingArtifact { .. }
            | Self::Ledger(LedgerError::UnknownVersion { .. }) => ErrorKind::InvalidTag,
            Self::InvalidProjectId { .. } | Self::ProjectNotFound { .. } => ErrorKind::NotFound,
            Self::ProjectExists { .. }
            | Self::ConfigExists { .. }
            | Self::Ledger(LedgerError::DuplicateVersion { .. }) => ErrorKind::Conflict,
            Self::Checkout { .. } => ErrorKind::CheckoutFailed,
            Self::BuildFailed { .. } | Self::BuildExec { .. } | Self::MissingOutput { .. } => {
                ErrorKind::BuildFailed
            }
            Self::BuildTimeout { .. } => ErrorKind::BuildTimeout,
            Self::Publish { .. } => ErrorKind::PublishFailed,
            Self::Switch { .. } => ErrorKind::SwitchFailed,
            Self::Remove { .. }
            | Self::Workspace { .. }
            | Self::Lock { .. }
            | Self::Util(_)
            | Self::Registry(_)
            | Self::Config(_) => ErrorKind::Internal,
        }
    }

    /// Output captured from the failed external command, if any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::Checkout { source, .. } => source.diagnostics(),
            Self::BuildFailed { output, .. }
            | Self::BuildTimeout { output, .. }
            | Self::MissingOutput { output, .. } => {
                Some(output.as_str()).filter(|o| !o.trim().is_empty())
            }
            _ => None,
        }
    }
}
