//! Error types for docship-git.

use std::path::PathBuf;

/// Errors produced by repository acquisition.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// No usable git binary was found.
    #[error("git not found at {path}; install git or set `git.binary` in docship.toml")]
    NotFound { path: PathBuf },

    /// `git --version` returned an unexpected format.
    #[error("cannot parse git version from output: {output}")]
    VersionParse { output: String },

    /// Stale content at the destination could not be removed before cloning.
    #[error("cannot clear checkout destination: {source}")]
    Cleanup {
        source: docship_util::error::UtilError,
    },

    /// The remote could not be cloned (network, auth, or not found).
    #[error("cannot clone {remote}")]
    Clone { remote: String, stderr: String },

    /// The requested ref does not exist in the clone.
    #[error("cannot check out \"{reference}\"")]
    Checkout { reference: String, stderr: String },

    /// A read-only query against the working copy failed.
    #[error("git {operation} failed")]
    Query {
        operation: &'static str,
        stderr: String,
    },

    /// The git binary could not be executed.
    #[error("{0}")]
    Exec(#[from] docship_util::error::UtilError),
}

impl GitError {
    /// Diagnostic output captured from the failed git invocation, if any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::Clone { stderr, .. }
            | Self::Checkout { stderr, .. }
            | Self::Query { stderr, .. } => Some(stderr.as_str()).filter(|s| !s.trim().is_empty()),
            _ => None,
        }
    }
}
