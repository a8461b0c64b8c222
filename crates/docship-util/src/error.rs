//! Error types for docship-util.

use crate::segment::SegmentKind;

/// Errors produced by utility functions.
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    /// An I/O operation failed.
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// A command failed to start or could not be waited on.
    #[error("cannot execute {command}: {source}")]
    CommandExec {
        command: String,
        source: std::io::Error,
    },

    /// A tag or project id cannot be used as a single path segment.
    #[error("invalid {kind} \"{value}\": {reason}")]
    InvalidSegment {
        kind: SegmentKind,
        value: String,
        reason: &'static str,
    },

    /// An advisory lock could not be acquired.
    #[error("cannot lock {path}: {source}")]
    Lock {
        path: String,
        source: std::io::Error,
    },
}
