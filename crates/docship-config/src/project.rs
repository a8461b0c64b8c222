//! Project records and their version ledger.
//!
//! The ledger is the ordered list of published tags plus the optional
//! `current_tag` pointer. Insertion order is publication order and is never
//! re-sorted. `current_tag`, when set, always names an entry in `versions`;
//! every mutating method below preserves that.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A project whose tagged builds are published to the artifact store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Stable external identifier; also the project's directory name in the store.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Remote the build pipeline clones from.
    pub repository_url: String,
    /// Shell command run in the checkout; the service default applies when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_tag: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, rename = "version", skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<Version>,
}

/// One published version of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub tag: String,
    pub published_at: DateTime<Utc>,
}

impl Project {
    /// Create a project with an empty ledger.
    pub fn new(id: &str, repository_url: &str) -> Self {
        Self {
            id: id.to_owned(),
            name: id.to_owned(),
            repository_url: repository_url.to_owned(),
            build_command: None,
            current_tag: None,
            created_at: Utc::now(),
            versions: Vec::new(),
        }
    }

    /// Position of `tag` in the ledger.
    ///
    /// An empty `tag` means "the current version": the position of
    /// `current_tag` is returned instead, or `None` when no current tag is set.
    pub fn tag_index(&self, tag: &str) -> Option<usize> {
        if tag.is_empty() {
            return self
                .current_tag
                .as_deref()
                .filter(|current| !current.is_empty())
                .and_then(|current| self.tag_index(current));
        }
        self.versions.iter().position(|v| v.tag == tag)
    }

    /// Whether `tag` is the current version. Never true for an empty tag.
    pub fn is_current_tag(&self, tag: &str) -> bool {
        !tag.is_empty() && self.current_tag.as_deref() == Some(tag)
    }

    pub fn has_version(&self, tag: &str) -> bool {
        !tag.is_empty() && self.tag_index(tag).is_some()
    }

    pub fn version(&self, tag: &str) -> Option<&Version> {
        self.tag_index(tag).and_then(|ix| self.versions.get(ix))
    }

    /// Record a successful publication of `tag`.
    ///
    /// Appends a new entry. Re-publishing a tag that is already in the ledger
    /// keeps the existing entry, and its position, untouched. Returns `true`
    /// if an entry was added.
    pub fn record_publication(&mut self, tag: &str, published_at: DateTime<Utc>) -> bool {
        if self.has_version(tag) {
            return false;
        }
        self.versions.push(Version {
            tag: tag.to_owned(),
            published_at,
        });
        true
    }

    /// Append `tag`, failing if it is already present.
    ///
    /// # Errors
    /// Returns `LedgerError::DuplicateVersion` if the tag is already in the ledger.
    pub fn add_version(&mut self, tag: &str, published_at: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.has_version(tag) {
            return Err(LedgerError::DuplicateVersion {
                project: self.id.clone(),
                tag: tag.to_owned(),
            });
        }
        self.record_publication(tag, published_at);
        Ok(())
    }

    /// Remove `tag` from the ledger, clearing `current_tag` if it pointed there.
    ///
    /// # Errors
    /// Returns `LedgerError::UnknownVersion` if the tag is not in the ledger.
    pub fn remove_version(&mut self, tag: &str) -> Result<Version, LedgerError> {
        let Some(ix) = self.tag_index(tag).filter(|_| !tag.is_empty()) else {
            return Err(self.unknown(tag));
        };
        let removed = self.versions.remove(ix);
        if self.is_current_tag(tag) {
            self.current_tag = None;
        }
        Ok(removed)
    }

    /// Point `current_tag` at a tag already in the ledger.
    ///
    /// Returns the previous current tag.
    ///
    /// # Errors
    /// Returns `LedgerError::UnknownVersion` if the tag is not in the ledger.
    pub fn set_current(&mut self, tag: &str) -> Result<Option<String>, LedgerError> {
        if !self.has_version(tag) {
            return Err(self.unknown(tag));
        }
        Ok(self.current_tag.replace(tag.to_owned()))
    }

    pub fn clear_current(&mut self) -> Option<String> {
        self.current_tag.take()
    }

    /// Keep only the entries for which `keep` returns true.
    ///
    /// Order is preserved; `current_tag` is cleared if its entry is dropped.
    /// Returns the dropped tags.
    pub fn retain_versions(&mut self, mut keep: impl FnMut(&Version) -> bool) -> Vec<String> {
        let mut dropped = Vec::new();
        self.versions.retain(|v| {
            let kept = keep(v);
            if !kept {
                dropped.push(v.tag.clone());
            }
            kept
        });
        if self
            .current_tag
            .as_deref()
            .is_some_and(|current| dropped.iter().any(|d| d == current))
        {
            self.current_tag = None;
        }
        dropped
    }

    /// Build command for this project, or `default` when none is configured.
    pub fn build_command_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.build_command
            .as_deref()
            .filter(|cmd| !cmd.trim().is_empty())
            .unwrap_or(default)
    }

    fn unknown(&self, tag: &str) -> LedgerError {
        LedgerError::UnknownVersion {
            project: self.id.clone(),
            tag: tag.to_owned(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("project \"{project}\" does not have a version \"{tag}\"")]
    UnknownVersion { project: String, tag: String },
    #[error("project \"{project}\" already has a version \"{tag}\"")]
    DuplicateVersion { project: String, tag: String },
}
