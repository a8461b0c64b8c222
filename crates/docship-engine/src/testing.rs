//! Fixtures shared by the engine's unit tests.

#![allow(clippy::unwrap_used)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use docship_config::{Config, Project};
use docship_git::{GitError, SourceControl, Status};

use crate::pipeline::Publisher;

pub(crate) fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(["-c", "user.name=Docship Test", "-c", "user.email=test@docship.invalid"])
        .args(["-c", "commit.gpgsign=false", "-c", "tag.gpgsign=false"])
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

/// A repository tagged `1.0.0` and `2.0.0`; `VERSION` holds the tag name.
pub(crate) fn fixture_repo(dir: &Path) -> String {
    fs::create_dir_all(dir).unwrap();
    git(dir, &["init", "--quiet"]);
    for tag in ["1.0.0", "2.0.0"] {
        fs::write(dir.join("VERSION"), tag).unwrap();
        git(dir, &["add", "VERSION"]);
        git(dir, &["commit", "--quiet", "-m", tag]);
        git(dir, &["tag", tag]);
    }
    dir.display().to_string()
}

/// Service config with every directory inside `root`.
pub(crate) fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.store.root = root.join("public");
    config.workspace.root = Some(root.join("work"));
    config.registry.dir = root.join("projects");
    config.build.timeout_secs = 30;
    config
}

/// Build command that publishes the checked-out `VERSION` file as `index.html`.
pub(crate) const COPY_VERSION: &str = "mkdir -p build && cp VERSION build/index.html";

pub(crate) fn register(
    publisher: &Publisher<impl SourceControl>,
    url: &str,
    command: &str,
) -> Project {
    let mut project = Project::new("demo", url);
    project.build_command = Some(command.to_owned());
    publisher.registry().save(&project).unwrap();
    project
}

/// Entries left below the workspace root for `project`.
pub(crate) fn leftover_workspaces(config: &Config, project: &str) -> Vec<PathBuf> {
    match fs::read_dir(config.workspace_root().join(project)) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

/// Source control that writes the requested ref to `VERSION` instead of cloning.
#[derive(Debug, Default, Clone)]
pub(crate) struct FakeCheckout;

impl SourceControl for FakeCheckout {
    fn checkout(
        &self,
        _remote: &str,
        destination: &Path,
        reference: &str,
    ) -> Result<(), GitError> {
        fs::create_dir_all(destination).unwrap();
        fs::write(destination.join("VERSION"), reference).unwrap();
        Ok(())
    }

    fn status(&self, _working_copy: &Path) -> Result<Status, GitError> {
        Ok(Status::default())
    }

    fn head_tags(&self, working_copy: &Path) -> Result<Vec<String>, GitError> {
        Ok(vec![fs::read_to_string(working_copy.join("VERSION")).unwrap()])
    }
}
