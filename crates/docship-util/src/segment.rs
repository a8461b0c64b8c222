//! Validation of names that end up as a single directory entry on disk.
//!
//! Tags and project ids are joined directly onto the artifact store root and
//! the workspace root, and tags are also handed to `git checkout`. Anything
//! accepted here is safe in both places: it cannot traverse, cannot hide, cannot
//! be mistaken for a command-line option, and cannot shadow the `current` alias.

use std::fmt;

use crate::error::UtilError;

/// Longest accepted segment, in bytes.
pub const MAX_SEGMENT_LEN: usize = 128;

/// Names that are owned by the artifact store layout itself.
pub const RESERVED_SEGMENTS: &[&str] = &["current"];

/// What a validated segment names; used in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Tag,
    ProjectId,
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag => f.write_str("tag"),
            Self::ProjectId => f.write_str("project id"),
        }
    }
}

/// Validate a tag against the tag-format policy.
///
/// # Errors
/// Returns `UtilError::InvalidSegment` describing the first violated rule.
pub fn validate_tag(tag: &str) -> Result<(), UtilError> {
    validate_segment(SegmentKind::Tag, tag)
}

/// Validate a project id against the same policy as tags.
///
/// # Errors
/// Returns `UtilError::InvalidSegment` describing the first violated rule.
pub fn validate_project_id(id: &str) -> Result<(), UtilError> {
    validate_segment(SegmentKind::ProjectId, id)
}

/// Validate that `value` is usable as a single path segment.
///
/// Allows only `[A-Za-z0-9._-]`, at most [`MAX_SEGMENT_LEN`] bytes, with no
/// leading `.` or `-`, and none of the [`RESERVED_SEGMENTS`].
///
/// # Errors
/// Returns `UtilError::InvalidSegment` describing the first violated rule.
pub fn validate_segment(kind: SegmentKind, value: &str) -> Result<(), UtilError> {
    let reason = if value.is_empty() {
        Some("must not be empty")
    } else if value.len() > MAX_SEGMENT_LEN {
        Some("must be at most 128 characters long")
    } else if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
    {
        Some("only alphanumeric characters, dots, hyphens, and underscores are allowed")
    } else if value.starts_with('.') {
        Some("must not start with a dot")
    } else if value.starts_with('-') {
        Some("must not start with a hyphen")
    } else if RESERVED_SEGMENTS.contains(&value) {
        Some("name is reserved")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(UtilError::InvalidSegment {
            kind,
            value: value.to_owned(),
            reason,
        }),
        None => Ok(()),
    }
}
