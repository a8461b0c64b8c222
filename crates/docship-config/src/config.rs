use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Default file name of the service configuration.
pub const CONFIG_FILE_NAME: &str = "docship.toml";

/// The `docship.toml` service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub workspace: WorkspaceSection,
    #[serde(default)]
    pub build: BuildSection,
    #[serde(default)]
    pub git: GitSection,
    #[serde(default)]
    pub registry: RegistrySection,
}

/// Where published artifacts are served from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSection {
    #[serde(default = "default_store_root")]
    pub root: PathBuf,
}

/// Where per-build temporary checkouts are created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WorkspaceSection {
    /// Defaults to `<system temp>/docship`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

/// How project builds are run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSection {
    /// Build command used when a project does not define its own.
    #[serde(default = "default_build_command")]
    pub command: String,
    /// Subdirectory of the checkout that the build command writes its output to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GitSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<PathBuf>,
}

/// Where project records are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySection {
    #[serde(default = "default_registry_dir")]
    pub dir: PathBuf,
}

fn default_store_root() -> PathBuf {
    PathBuf::from("public")
}

fn default_build_command() -> String {
    "./build.sh".to_owned()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("build")
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_registry_dir() -> PathBuf {
    PathBuf::from("projects")
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            root: default_store_root(),
        }
    }
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            command: default_build_command(),
            output_dir: default_output_dir(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            dir: default_registry_dir(),
        }
    }
}

impl Config {
    /// Read, parse and validate a `docship.toml` from the given path.
    ///
    /// Relative paths in the file are resolved against the directory that
    /// contains it.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, contains invalid TOML, or
    /// fails validation.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config = Self::from_str_at(&content, path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(config.resolve_relative_to(base))
    }

    /// Parse and validate config text; `path` is only used in error messages.
    ///
    /// # Errors
    /// Returns an error if the text is invalid TOML or fails validation.
    pub fn from_str_at(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values that would otherwise fail late, mid-pipeline.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.build.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "build.timeout_secs",
                reason: "must be greater than zero".to_owned(),
            });
        }
        if self.build.command.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "build.command",
                reason: "must not be empty".to_owned(),
            });
        }
        let output_dir = &self.build.output_dir;
        let only_normal = output_dir
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if output_dir.as_os_str().is_empty() || !only_normal {
            return Err(ConfigError::Invalid {
                field: "build.output_dir",
                reason: format!(
                    "\"{}\" must be a relative path inside the checkout",
                    output_dir.display()
                ),
            });
        }
        Ok(())
    }

    /// Anchor every relative directory setting at `base`.
    pub fn resolve_relative_to(mut self, base: &Path) -> Self {
        let anchor = |p: PathBuf| if p.is_absolute() { p } else { base.join(p) };
        self.store.root = anchor(self.store.root);
        self.workspace.root = self.workspace.root.map(anchor);
        self.registry.dir = anchor(self.registry.dir);
        self
    }

    /// Root of the per-build temporary workspaces.
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace
            .root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("docship"))
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build.timeout_secs)
    }

    /// Render as human-readable TOML.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|source| ConfigError::Serialize { source })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid docship.toml at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid `{field}` in docship.toml: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("cannot serialize docship.toml: {source}")]
    Serialize { source: toml::ser::Error },
}
