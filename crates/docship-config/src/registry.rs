//! File-backed storage of project records: one `<id>.toml` per project.

use std::path::{Path, PathBuf};

use crate::project::Project;

/// Directory of project records.
#[derive(Debug, Clone)]
pub struct Registry {
    dir: PathBuf,
}

impl Registry {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file for `id`. The id must already be validated.
    pub fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.toml"))
    }

    /// Load a project record, or `None` if no record exists.
    ///
    /// # Errors
    /// Returns an error if the record exists but cannot be read or parsed.
    pub fn load(&self, id: &str) -> Result<Option<Project>, RegistryError> {
        let path = self.record_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|e| RegistryError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let project: Project = toml::from_str(&content).map_err(|e| RegistryError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        if project.id != id {
            return Err(RegistryError::IdMismatch {
                path: path.display().to_string(),
                found: project.id,
            });
        }
        Ok(Some(project))
    }

    /// Persist a project record.
    ///
    /// Uses atomic write (write-to-temp-then-rename) so a crash never leaves a
    /// truncated record behind.
    ///
    /// # Errors
    /// Returns an error if serialization fails or the file cannot be written.
    pub fn save(&self, project: &Project) -> Result<(), RegistryError> {
        let content =
            toml::to_string_pretty(project).map_err(|e| RegistryError::Serialize { source: e })?;
        docship_util::fs::write_atomic(&self.record_path(&project.id), &content)?;
        Ok(())
    }

    /// Delete a project record. Returns `false` if there was none.
    ///
    /// # Errors
    /// Returns an error if the record exists but cannot be removed.
    pub fn remove(&self, id: &str) -> Result<bool, RegistryError> {
        let path = self.record_path(id);
        if !path.exists() {
            return Ok(false);
        }
        docship_util::fs::remove_file_if_exists(&path)?;
        Ok(true)
    }

    /// Ids of all stored projects, sorted.
    ///
    /// # Errors
    /// Returns an error if the registry directory exists but cannot be read.
    pub fn list_ids(&self) -> Result<Vec<String>, RegistryError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(RegistryError::Read {
                    path: self.dir.display().to_string(),
                    source: e,
                })
            }
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| RegistryError::Read {
                path: self.dir.display().to_string(),
                source: e,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if docship_util::segment::validate_project_id(stem).is_ok() {
                    ids.push(stem.to_owned());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid project record at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("project record at {path} belongs to \"{found}\"")]
    IdMismatch { path: String, found: String },
    #[error("cannot serialize project record: {source}")]
    Serialize { source: toml::ser::Error },
    #[error("{0}")]
    Util(#[from] docship_util::error::UtilError),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn load_missing_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = Registry::new(tmp.path());
        assert!(registry.load("demo").unwrap().is_none());
    }

    #[test]
    fn save_then_load_preserves_ledger_order() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = Registry::new(&tmp.path().join("projects"));

        let mut project = Project::new("demo", "https://example.com/demo.git");
        project.build_command = Some("make docs".to_owned());
        project.add_version("2.0.0", Utc::now()).unwrap();
        project.add_version("1.0.0", Utc::now()).unwrap();
        project.set_current("1.0.0").unwrap();
        registry.save(&project).unwrap();

        let loaded = registry.load("demo").unwrap().unwrap();
        assert_eq!(loaded, project);
        let tags: Vec<_> = loaded.versions.iter().map(|v| v.tag.as_str()).collect();
        assert_eq!(tags, ["2.0.0", "1.0.0"]);
    }

    #[test]
    fn record_is_human_readable() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = Registry::new(tmp.path());
        let mut project = Project::new("demo", "https://example.com/demo.git");
        project.add_version("1.0.0", Utc::now()).unwrap();
        registry.save(&project).unwrap();

        let text = std::fs::read_to_string(registry.record_path("demo")).unwrap();
        assert!(text.contains("repository_url = \"https://example.com/demo.git\""));
        assert!(text.contains("[[version]]"));
        assert!(text.contains("tag = \"1.0.0\""));
    }

    #[test]
    fn load_rejects_mismatched_id() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = Registry::new(tmp.path());
        registry
            .save(&Project::new("other", "https://example.com/o.git"))
            .unwrap();
        std::fs::rename(registry.record_path("other"), registry.record_path("demo")).unwrap();

        let err = registry.load("demo").unwrap_err().to_string();
        assert!(err.contains("belongs to \"other\""), "error was: {err}");
    }

    #[test]
    fn load_reports_corrupt_record() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = Registry::new(tmp.path());
        std::fs::write(registry.record_path("demo"), "id = ").unwrap();
        let err = registry.load("demo").unwrap_err().to_string();
        assert!(err.contains("invalid project record"), "error was: {err}");
    }

    #[test]
    fn remove_and_list() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = Registry::new(tmp.path());
        for id in ["beta", "alpha"] {
            registry
                .save(&Project::new(id, "https://example.com/x.git"))
                .unwrap();
        }
        std::fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        assert_eq!(registry.list_ids().unwrap(), ["alpha", "beta"]);
        assert!(registry.remove("alpha").unwrap());
        assert!(!registry.remove("alpha").unwrap());
        assert_eq!(registry.list_ids().unwrap(), ["beta"]);
    }

    #[test]
    fn list_ids_of_missing_dir_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = Registry::new(&tmp.path().join("missing"));
        assert!(registry.list_ids().unwrap().is_empty());
    }
}
