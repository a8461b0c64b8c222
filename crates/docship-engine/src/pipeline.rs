//! The build-and-publish pipeline and the current-version switch.
//!
//! A build runs checkout and the build command in a private workspace with
//! no lock held; only moving the output into the store and recording it in
//! the ledger happen under the project lock. Switching the current version
//! runs entirely under the lock.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use docship_config::{Config, Project, Registry};
use docship_git::{git_binary, GitCli, SourceControl};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::build::{BuildCommand, BuildStatus};
use crate::error::EngineError;
use crate::store::{ArtifactStore, Publication};
use crate::workspace::Workspace;

/// Result of a successful [`Publisher::request_build`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub project_id: String,
    pub tag: String,
    pub artifact_path: PathBuf,
    /// Wall time of the whole pipeline, checkout included.
    pub duration: Duration,
    /// Whether an earlier artifact for this tag was replaced.
    pub republished: bool,
}

/// Result of a successful [`Publisher::request_set_current`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwitchReport {
    pub project_id: String,
    pub tag: String,
    pub previous: Option<String>,
}

/// Entry point for every operation on projects and their published versions.
#[derive(Debug)]
pub struct Publisher<S = GitCli> {
    config: Config,
    registry: Registry,
    store: ArtifactStore,
    scm: S,
}

impl Publisher<GitCli> {
    /// A publisher that checks out with the configured `git` binary.
    pub fn new(config: Config) -> Self {
        let scm = GitCli::new(&git_binary(config.git.binary.as_deref()));
        Self::with_source_control(config, scm)
    }
}

impl<S: SourceControl> Publisher<S> {
    pub fn with_source_control(config: Config, scm: S) -> Self {
        let registry = Registry::new(&config.registry.dir);
        let store = ArtifactStore::new(&config.store.root);
        Self {
            config,
            registry,
            store,
            scm,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Check out `tag`, build it, and publish the output as a new version.
    ///
    /// Steps:
    /// 1. Validate the tag format and load the project
    /// 2. Create a fresh workspace under `<workspace root>/<project>/`
    /// 3. Check out `tag` into it
    /// 4. Run the project's build command with the configured timeout
    /// 5. Require the configured output directory to exist
    /// 6. Under the project lock: move the output into the store, then append
    ///    the tag to the ledger unless it is already there
    ///
    /// The workspace is removed on every path out of this function.
    ///
    /// # Errors
    /// Returns an error whose [`kind`](EngineError::kind) names the failed
    /// step: `invalid-tag`, `not-found`, `checkout-failed`, `build-failed`,
    /// `build-timeout`, `publish-failed`, or `internal`.
    #[instrument(skip(self))]
    pub fn request_build(&self, project_id: &str, tag: &str) -> Result<BuildReport, EngineError> {
        let start = Instant::now();
        check_tag(tag)?;
        let project = self.load_project(project_id)?;

        let workspace = Workspace::create(&self.config.workspace_root(), &project.id)
            .map_err(|source| EngineError::Workspace { source })?;
        let result = self.build_and_publish(&project, tag, &workspace);
        if let Err(err) = workspace.close() {
            warn!(error = %err, "cannot remove build workspace");
        }
        let publication = result?;

        let duration = start.elapsed();
        info!(
            duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            republished = publication.replaced,
            "published"
        );
        Ok(BuildReport {
            project_id: project.id,
            tag: tag.to_owned(),
            artifact_path: publication.path,
            duration,
            republished: publication.replaced,
        })
    }

    fn build_and_publish(
        &self,
        project: &Project,
        tag: &str,
        workspace: &Workspace,
    ) -> Result<Publication, EngineError> {
        info!("checking out");
        self.scm
            .checkout(&project.repository_url, workspace.path(), tag)
            .map_err(|source| EngineError::Checkout {
                project: project.id.clone(),
                tag: tag.to_owned(),
                source,
            })?;

        let command = project.build_command_or(&self.config.build.command);
        let timeout = self.config.build_timeout();
        info!(%command, "building");
        let run = BuildCommand::new(command, workspace.path())
            .timeout(timeout)
            .env("DOCSHIP_PROJECT", &project.id)
            .env("DOCSHIP_TAG", tag)
            .env("DOCSHIP_OUTPUT_DIR", &self.config.build.output_dir)
            .run()
            .map_err(|source| EngineError::BuildExec {
                project: project.id.clone(),
                tag: tag.to_owned(),
                source,
            })?;
        match run.status {
            BuildStatus::Succeeded => {}
            BuildStatus::Failed { exit_code } => {
                return Err(EngineError::BuildFailed {
                    project: project.id.clone(),
                    tag: tag.to_owned(),
                    exit_code,
                    output: run.output,
                });
            }
            BuildStatus::TimedOut => {
                return Err(EngineError::BuildTimeout {
                    project: project.id.clone(),
                    tag: tag.to_owned(),
                    timeout,
                    output: run.output,
                });
            }
        }

        let output_dir = workspace.path().join(&self.config.build.output_dir);
        let is_dir = std::fs::symlink_metadata(&output_dir).is_ok_and(|meta| meta.is_dir());
        if !is_dir {
            return Err(EngineError::MissingOutput {
                project: project.id.clone(),
                tag: tag.to_owned(),
                output_dir: self.config.build.output_dir.display().to_string(),
                output: run.output,
            });
        }

        let _lock = self.store.lock(&project.id)?;
        // The record may have changed, or been removed, while the build ran.
        let mut latest = self.load_project(&project.id)?;
        let publication = self.store.publish(&project.id, tag, &output_dir)?;
        if latest.record_publication(tag, Utc::now()) {
            self.registry.save(&latest)?;
        }
        Ok(publication)
    }

    /// Point the project's `current` alias at an already published tag and
    /// persist the new current tag.
    ///
    /// # Errors
    /// Returns `invalid-tag` if the tag is malformed or not in the ledger
    /// (the alias is left untouched), `not-found` for an unknown project,
    /// `switch-failed` if the alias cannot be replaced, or `internal`.
    #[instrument(skip(self))]
    pub fn request_set_current(
        &self,
        project_id: &str,
        tag: &str,
    ) -> Result<SwitchReport, EngineError> {
        check_tag(tag)?;
        check_project_id(project_id)?;

        let _lock = self.store.lock(project_id)?;
        let mut project = self.load_project(project_id)?;
        let previous = project.set_current(tag)?;
        self.store.set_current(project_id, tag)?;
        self.registry.save(&project)?;
        info!(previous = previous.as_deref().unwrap_or("-"), "current version switched");

        Ok(SwitchReport {
            project_id: project.id,
            tag: tag.to_owned(),
            previous,
        })
    }

    /// Load a project record, mapping a missing record to `not-found`.
    pub(crate) fn load_project(&self, project_id: &str) -> Result<Project, EngineError> {
        check_project_id(project_id)?;
        self.registry
            .load(project_id)?
            .ok_or_else(|| EngineError::ProjectNotFound {
                project: project_id.to_owned(),
            })
    }
}

pub(crate) fn check_tag(tag: &str) -> Result<(), EngineError> {
    docship_util::segment::validate_tag(tag).map_err(|source| EngineError::InvalidTag { source })
}

pub(crate) fn check_project_id(project_id: &str) -> Result<(), EngineError> {
    docship_util::segment::validate_project_id(project_id)
        .map_err(|source| EngineError::InvalidProjectId { source })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;
    use std::sync::{Arc, Barrier};
    use std::thread;

    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{
        fixture_repo, leftover_workspaces, register, test_config, FakeCheckout, COPY_VERSION,
    };

    fn git_publisher(root: &std::path::Path) -> Publisher {
        Publisher::with_source_control(test_config(root), GitCli::default())
    }

    #[test]
    fn build_publishes_tag_and_records_it() {
        let tmp = tempfile::tempdir().unwrap();
        let url = fixture_repo(&tmp.path().join("remote"));
        let publisher = git_publisher(tmp.path());
        register(&publisher, &url, COPY_VERSION);

        let report = publisher.request_build("demo", "1.0.0").unwrap();

        let index = publisher.store().tag_dir("demo", "1.0.0").join("index.html");
        assert_eq!(fs::read_to_string(index).unwrap(), "1.0.0");
        assert_eq!(report.artifact_path, publisher.store().tag_dir("demo", "1.0.0"));
        assert!(!report.republished);
        let project = publisher.registry().load("demo").unwrap().unwrap();
        let tags: Vec<_> = project.versions.iter().map(|v| v.tag.as_str()).collect();
        assert_eq!(tags, ["1.0.0"]);
        assert_eq!(project.current_tag, None);
        assert!(leftover_workspaces(publisher.config(), "demo").is_empty());
    }

    #[test]
    fn failing_build_publishes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let url = fixture_repo(&tmp.path().join("remote"));
        let publisher = git_publisher(tmp.path());
        register(&publisher, &url, "mkdir -p build && echo 'doc error' >&2 && exit 1");

        let err = publisher.request_build("demo", "1.0.0").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::BuildFailed);
        assert!(err.diagnostics().unwrap().contains("doc error"));
        assert!(!publisher.store().tag_dir("demo", "1.0.0").exists());
        let project = publisher.registry().load("demo").unwrap().unwrap();
        assert!(project.versions.is_empty());
        assert!(leftover_workspaces(publisher.config(), "demo").is_empty());
    }

    #[test]
    fn rebuild_replaces_artifact_and_keeps_single_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let url = fixture_repo(&tmp.path().join("remote"));
        let content = tmp.path().join("content.html");
        let publisher = git_publisher(tmp.path());
        let command = format!("mkdir -p build && cp '{}' build/index.html", content.display());
        register(&publisher, &url, &command);

        fs::write(&content, "first build").unwrap();
        publisher.request_build("demo", "1.0.0").unwrap();
        fs::write(&content, "second build").unwrap();
        let report = publisher.request_build("demo", "1.0.0").unwrap();

        assert!(report.republished);
        let index = publisher.store().tag_dir("demo", "1.0.0").join("index.html");
        assert_eq!(fs::read_to_string(index).unwrap(), "second build");
        let project = publisher.registry().load("demo").unwrap().unwrap();
        assert_eq!(project.versions.len(), 1);
    }

    #[test]
    fn set_current_to_unknown_tag_leaves_alias() {
        let tmp = tempfile::tempdir().unwrap();
        let url = fixture_repo(&tmp.path().join("remote"));
        let publisher = git_publisher(tmp.path());
        register(&publisher, &url, COPY_VERSION);
        publisher.request_build("demo", "1.0.0").unwrap();
        publisher.request_set_current("demo", "1.0.0").unwrap();

        let err = publisher.request_set_current("demo", "bad-tag").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidTag);
        assert_eq!(publisher.store().current_tag("demo").as_deref(), Some("1.0.0"));
        let project = publisher.registry().load("demo").unwrap().unwrap();
        assert_eq!(project.current_tag.as_deref(), Some("1.0.0"));
    }

    #[test]
    fn set_current_moves_alias_between_versions() {
        let tmp = tempfile::tempdir().unwrap();
        let url = fixture_repo(&tmp.path().join("remote"));
        let publisher = git_publisher(tmp.path());
        register(&publisher, &url, COPY_VERSION);
        publisher.request_build("demo", "1.0.0").unwrap();
        publisher.request_build("demo", "2.0.0").unwrap();

        let first = publisher.request_set_current("demo", "2.0.0").unwrap();
        assert_eq!(first.previous, None);
        let alias = publisher.store().alias_path("demo");
        assert_eq!(fs::read_to_string(alias.join("index.html")).unwrap(), "2.0.0");

        let second = publisher.request_set_current("demo", "1.0.0").unwrap();
        assert_eq!(second.previous.as_deref(), Some("2.0.0"));
        assert_eq!(fs::read_to_string(alias.join("index.html")).unwrap(), "1.0.0");
        let project = publisher.registry().load("demo").unwrap().unwrap();
        assert_eq!(project.current_tag.as_deref(), Some("1.0.0"));
    }

    #[test]
    fn timeout_kills_build_and_removes_workspace() {
        let tmp = tempfile::tempdir().unwrap();
        let url = fixture_repo(&tmp.path().join("remote"));
        let mut config = test_config(tmp.path());
        config.build.timeout_secs = 1;
        let publisher = Publisher::with_source_control(config, GitCli::default());
        register(&publisher, &url, "mkdir -p build && sleep 30");

        let err = publisher.request_build("demo", "1.0.0").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::BuildTimeout);
        assert!(leftover_workspaces(publisher.config(), "demo").is_empty());
        assert!(!publisher.store().tag_dir("demo", "1.0.0").exists());
    }

    #[test]
    fn unknown_ref_is_checkout_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let url = fixture_repo(&tmp.path().join("remote"));
        let publisher = git_publisher(tmp.path());
        register(&publisher, &url, COPY_VERSION);

        let err = publisher.request_build("demo", "9.9.9").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CheckoutFailed);
        assert!(err.diagnostics().is_some());
        assert!(leftover_workspaces(publisher.config(), "demo").is_empty());
        assert!(!publisher.store().project_dir("demo").exists());
    }

    #[test]
    fn missing_output_dir_is_build_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let publisher = Publisher::with_source_control(test_config(tmp.path()), FakeCheckout);
        register(&publisher, "unused", "echo 'nothing to see'");

        let err = publisher.request_build("demo", "1.0.0").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::BuildFailed);
        assert!(matches!(err, EngineError::MissingOutput { .. }), "got: {err:?}");
        assert!(err.diagnostics().unwrap().contains("nothing to see"));
    }

    #[test]
    fn publish_failure_removes_workspace_and_keeps_ledger() {
        let tmp = tempfile::tempdir().unwrap();
        let publisher = Publisher::with_source_control(test_config(tmp.path()), FakeCheckout);
        register(&publisher, "unused", COPY_VERSION);
        fs::create_dir_all(publisher.store().root()).unwrap();
        fs::write(publisher.store().project_dir("demo"), "not a directory").unwrap();

        let err = publisher.request_build("demo", "1.0.0").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PublishFailed);
        assert!(leftover_workspaces(publisher.config(), "demo").is_empty());
        let project = publisher.registry().load("demo").unwrap().unwrap();
        assert!(project.versions.is_empty());
    }

    #[test]
    fn switch_failure_keeps_persisted_current_tag() {
        let tmp = tempfile::tempdir().unwrap();
        let publisher = Publisher::with_source_control(test_config(tmp.path()), FakeCheckout);
        register(&publisher, "unused", COPY_VERSION);
        publisher.request_build("demo", "1.0.0").unwrap();
        publisher.request_build("demo", "2.0.0").unwrap();
        publisher.request_set_current("demo", "1.0.0").unwrap();
        fs::remove_dir_all(publisher.store().tag_dir("demo", "2.0.0")).unwrap();

        let err = publisher.request_set_current("demo", "2.0.0").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SwitchFailed);
        assert_eq!(publisher.store().current_tag("demo").as_deref(), Some("1.0.0"));
        let project = publisher.registry().load("demo").unwrap().unwrap();
        assert_eq!(project.current_tag.as_deref(), Some("1.0.0"));
    }

    #[test]
    fn invalid_tag_is_rejected_before_any_work() {
        let tmp = tempfile::tempdir().unwrap();
        let publisher = Publisher::with_source_control(test_config(tmp.path()), FakeCheckout);
        register(&publisher, "unused", COPY_VERSION);

        for tag in ["../etc", ".hidden", "a/b", "current", "", "-n"] {
            let err = publisher.request_build("demo", tag).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidTag, "tag {tag:?}");
        }
        assert!(!publisher.config().workspace_root().exists());
        assert!(!publisher.store().root().exists());
    }

    #[test]
    fn unknown_project_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let publisher = Publisher::with_source_control(test_config(tmp.path()), FakeCheckout);

        let err = publisher.request_build("ghost", "1.0.0").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = publisher.request_set_current("ghost", "1.0.0").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = publisher.request_build("../ghost", "1.0.0").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn project_removed_during_build_is_not_published() {
        let tmp = tempfile::tempdir().unwrap();
        let publisher = Publisher::with_source_control(test_config(tmp.path()), FakeCheckout);
        let record = publisher.registry().record_path("demo");
        let command = format!("rm '{}' && {COPY_VERSION}", record.display());
        register(&publisher, "unused", &command);

        let err = publisher.request_build("demo", "1.0.0").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(!publisher.store().tag_dir("demo", "1.0.0").exists());
    }

    #[test]
    fn concurrent_builds_of_same_tag_record_one_version() {
        let tmp = tempfile::tempdir().unwrap();
        let publisher = Publisher::with_source_control(test_config(tmp.path()), FakeCheckout);
        register(&publisher, "unused", COPY_VERSION);
        let publisher = Arc::new(publisher);

        let num_threads = 6;
        let barrier = Arc::new(Barrier::new(num_threads));
        let handles: Vec<_> = (0..num_threads)
            .map(|_| {
                let publisher = Arc::clone(&publisher);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    publisher.request_build("demo", "1.0.0").unwrap()
                })
            })
            .collect();
        let reports: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(reports.iter().filter(|r| !r.republished).count(), 1);
        let project = publisher.registry().load("demo").unwrap().unwrap();
        assert_eq!(project.versions.len(), 1);
        let index = publisher.store().tag_dir("demo", "1.0.0").join("index.html");
        assert_eq!(fs::read_to_string(index).unwrap(), "1.0.0");
        assert!(leftover_workspaces(publisher.config(), "demo").is_empty());
    }

    #[test]
    fn concurrent_builds_of_different_tags_keep_every_version() {
        let tmp = tempfile::tempdir().unwrap();
        let publisher = Publisher::with_source_control(test_config(tmp.path()), FakeCheckout);
        register(&publisher, "unused", COPY_VERSION);
        let publisher = Arc::new(publisher);

        let tags: Vec<String> = (0..8).map(|i| format!("1.{i}.0")).collect();
        let barrier = Arc::new(Barrier::new(tags.len()));
        let handles: Vec<_> = tags
            .iter()
            .cloned()
            .map(|tag| {
                let publisher = Arc::clone(&publisher);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    publisher.request_build("demo", &tag).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let project = publisher.registry().load("demo").unwrap().unwrap();
        assert_eq!(project.versions.len(), tags.len());
        for tag in &tags {
            assert!(project.has_version(tag), "missing {tag}");
            assert!(publisher.store().has_artifact("demo", tag));
        }
    }
}
