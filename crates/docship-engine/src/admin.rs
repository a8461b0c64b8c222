//! Administrative operations on project records and published versions.

use chrono::{DateTime, Utc};
use docship_config::Project;
use docship_git::SourceControl;
use serde::Serialize;
use tracing::{info, instrument};

use crate::error::EngineError;
use crate::pipeline::{check_project_id, check_tag, Publisher};

/// Parameters for [`Publisher::create_project`].
#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub id: String,
    pub repository_url: String,
    /// Display name; defaults to the id.
    pub name: Option<String>,
    pub build_command: Option<String>,
}

/// One row of a project's version listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub tag: String,
    pub published_at: DateTime<Utc>,
    pub is_current: bool,
    /// Path of the version relative to the served store root.
    pub url: String,
}

/// Result of [`Publisher::delete_version`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteReport {
    /// The tag was the current version; the alias has been removed.
    pub was_current: bool,
    /// An artifact directory existed and was removed.
    pub removed_artifact: bool,
}

impl<S: SourceControl> Publisher<S> {
    /// Register a new project with an empty ledger.
    ///
    /// # Errors
    /// Returns `not-found` for a malformed id, `conflict` if the project
    /// already exists, or `internal` if the record cannot be written.
    #[instrument(skip(self, new), fields(project = %new.id))]
    pub fn create_project(&self, new: NewProject) -> Result<Project, EngineError> {
        check_project_id(&new.id)?;
        let _lock = self.store().lock(&new.id)?;
        if self.registry().load(&new.id)?.is_some() {
            return Err(EngineError::ProjectExists { project: new.id });
        }

        let mut project = Project::new(&new.id, &new.repository_url);
        if let Some(name) = new.name.filter(|n| !n.trim().is_empty()) {
            project.name = name;
        }
        project.build_command = new.build_command.filter(|c| !c.trim().is_empty());
        self.registry().save(&project)?;
        info!("project created");
        Ok(project)
    }

    /// Delete a project's record and everything published for it.
    ///
    /// # Errors
    /// Returns `not-found` for an unknown project, or `internal` if the
    /// artifacts or record cannot be removed.
    #[instrument(skip(self))]
    pub fn remove_project(&self, project_id: &str) -> Result<(), EngineError> {
        check_project_id(project_id)?;
        let _lock = self.store().lock(project_id)?;
        let project = self.load_project(project_id)?;
        self.store()
            .remove_project(&project.id)
            .map_err(|source| EngineError::Remove {
                project: project.id.clone(),
                what: "published artifacts".to_owned(),
                source,
            })?;
        self.registry().remove(&project.id)?;
        info!("project removed");
        Ok(())
    }

    /// Delete one published version: alias (if it points there), artifact
    /// directory and ledger entry.
    ///
    /// # Errors
    /// Returns `invalid-tag` if the tag is malformed or neither in the ledger
    /// nor in the store, `not-found` for an unknown project, or `internal`.
    #[instrument(skip(self))]
    pub fn delete_version(&self, project_id: &str, tag: &str) -> Result<DeleteReport, EngineError> {
        check_tag(tag)?;
        check_project_id(project_id)?;
        let _lock = self.store().lock(project_id)?;
        let mut project = self.load_project(project_id)?;

        let in_ledger = project.has_version(tag);
        if !in_ledger && !self.store().has_artifact(project_id, tag) {
            return Err(EngineError::MissingArtifact {
                project: project.id,
                tag: tag.to_owned(),
            });
        }

        let remove_error = |what: String| {
            let project = project_id.to_owned();
            move |source| EngineError::Remove {
                project,
                what,
                source,
            }
        };
        let alias_points_here = self.store().alias_target(project_id).as_deref() == Some(tag);
        let was_current = alias_points_here || project.is_current_tag(tag);
        if was_current {
            self.store()
                .clear_current(project_id)
                .map_err(remove_error("current alias".to_owned()))?;
        }
        let removed_artifact = self
            .store()
            .remove_tag(project_id, tag)
            .map_err(remove_error(format!("artifact {tag}")))?;

        if in_ledger {
            project.remove_version(tag)?;
            self.registry().save(&project)?;
        }
        info!(was_current, "version deleted");
        Ok(DeleteReport {
            was_current,
            removed_artifact,
        })
    }

    /// Record an artifact that is already present in the store as a
    /// published version.
    ///
    /// # Errors
    /// Returns `invalid-tag` if the tag is malformed or has no artifact
    /// directory, `conflict` if it is already in the ledger, `not-found` for
    /// an unknown project, or `internal`.
    #[instrument(skip(self))]
    pub fn add_version(&self, project_id: &str, tag: &str) -> Result<(), EngineError> {
        check_tag(tag)?;
        check_project_id(project_id)?;
        let _lock = self.store().lock(project_id)?;
        let mut project = self.load_project(project_id)?;
        if !self.store().has_artifact(project_id, tag) {
            return Err(EngineError::MissingArtifact {
                project: project.id,
                tag: tag.to_owned(),
            });
        }
        project.add_version(tag, Utc::now())?;
        self.registry().save(&project)?;
        info!("version added");
        Ok(())
    }

    /// Published versions of a project, newest first.
    ///
    /// # Errors
    /// Returns `not-found` for an unknown project or `internal` if the
    /// record cannot be read.
    pub fn versions(&self, project_id: &str) -> Result<Vec<VersionInfo>, EngineError> {
        let project = self.load_project(project_id)?;
        Ok(project
            .versions
            .iter()
            .rev()
            .map(|v| VersionInfo {
                tag: v.tag.clone(),
                published_at: v.published_at,
                is_current: project.is_current_tag(&v.tag),
                url: format!("{}/{}/", project.id, v.tag),
            })
            .collect())
    }

    /// Every registered project, sorted by id.
    ///
    /// # Errors
    /// Returns `internal` if the registry cannot be read.
    pub fn list_projects(&self) -> Result<Vec<Project>, EngineError> {
        let mut projects = Vec::new();
        for id in self.registry().list_ids()? {
            if let Some(project) = self.registry().load(&id)? {
                projects.push(project);
            }
        }
        Ok(projects)
    }
}
