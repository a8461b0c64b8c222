//! Re-deriving a project's ledger from the artifact store.
//!
//! The store is the source of truth: a crash between a filesystem change and
//! the matching record update leaves the two disagreeing, and reconciling
//! makes the record follow the filesystem.

use chrono::{DateTime, Utc};
use docship_git::SourceControl;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::error::EngineError;
use crate::pipeline::{check_project_id, Publisher};

/// What [`Publisher::reconcile`] changed for one project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub project_id: String,
    /// Tags with an artifact but no ledger entry, appended oldest first.
    pub added: Vec<String>,
    /// Ledger entries without an artifact, removed.
    pub dropped: Vec<String>,
    pub previous_current: Option<String>,
    pub current: Option<String>,
    /// Interrupted-operation leftovers deleted from the project directory.
    pub swept: usize,
}

impl ReconcileReport {
    /// Whether the ledger already matched the store and nothing was swept.
    pub fn is_clean(&self) -> bool {
        self.added.is_empty()
            && self.dropped.is_empty()
            && self.previous_current == self.current
            && self.swept == 0
    }
}

impl<S: SourceControl> Publisher<S> {
    /// Make the ledger of `project_id` agree with its artifact directory.
    ///
    /// - ledger entries whose artifact is missing are dropped
    /// - artifacts missing from the ledger are appended in modification-time
    ///   order, with that time as their publication time
    /// - the current tag follows the `current` alias, or is cleared when the
    ///   alias is absent or does not resolve to a published tag
    ///
    /// # Errors
    /// Returns `not-found` for an unknown project or `internal` if the store
    /// or record cannot be read or written.
    #[instrument(skip(self))]
    pub fn reconcile(&self, project_id: &str) -> Result<ReconcileReport, EngineError> {
        check_project_id(project_id)?;
        let _lock = self.store().lock(project_id)?;
        let mut project = self.load_project(project_id)?;
        let previous_current = project.current_tag.clone();

        let swept = self.store().sweep_leftovers(project_id)?;
        let artifacts = self.store().published_artifacts(project_id)?;

        let dropped = project.retain_versions(|v| artifacts.iter().any(|a| a.tag == v.tag));
        let mut added = Vec::new();
        for artifact in &artifacts {
            let published_at = DateTime::<Utc>::from(artifact.modified);
            if project.record_publication(&artifact.tag, published_at) {
                added.push(artifact.tag.clone());
            }
        }

        match self.store().current_tag(project_id) {
            Some(tag) => {
                project.set_current(&tag)?;
            }
            None => {
                if docship_util::fs::is_symlink(&self.store().alias_path(project_id)) {
                    warn!("current alias does not resolve to a published version");
                }
                project.clear_current();
            }
        }

        let report = ReconcileReport {
            project_id: project.id.clone(),
            added,
            dropped,
            previous_current,
            current: project.current_tag.clone(),
            swept,
        };
        if report.added.is_empty()
            && report.dropped.is_empty()
            && report.previous_current == report.current
        {
            return Ok(report);
        }
        self.registry().save(&project)?;
        info!(
            added = report.added.len(),
            dropped = report.dropped.len(),
            "ledger reconciled"
        );
        Ok(report)
    }

    /// Reconcile every registered project, in id order.
    ///
    /// # Errors
    /// Stops at the first project that cannot be reconciled.
    pub fn reconcile_all(&self) -> Result<Vec<ReconcileReport>, EngineError> {
        self.registry()
            .list_ids()?
            .iter()
            .map(|id| self.reconcile(id))
            .collect()
    }
}
