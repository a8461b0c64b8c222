//! Scaffolding for `docship init`.

use std::path::{Path, PathBuf};

use docship_config::config::CONFIG_FILE_NAME;
use docship_config::Config;

use crate::error::EngineError;

/// Write a `docship.toml` with default settings into `dir`.
///
/// Returns the path of the new file.
///
/// # Errors
/// Returns an error if:
/// - A `docship.toml` already exists in `dir`
/// - The directory or file cannot be created
pub fn init_config(dir: &Path) -> Result<PathBuf, EngineError> {
    let path = dir.join(CONFIG_FILE_NAME);
    if path.exists() {
        return Err(EngineError::ConfigExists {
            path: path.display().to_string(),
        });
    }
    let content = Config::default().to_toml()?;
    docship_util::fs::ensure_dir(dir)?;
    docship_util::fs::write_atomic(&path, &content)?;
    Ok(path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn writes_default_config() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("site");

        let path = init_config(&dir).unwrap();

        assert_eq!(path, dir.join("docship.toml"));
        let config = Config::from_path(&path).unwrap();
        assert_eq!(config.store.root, dir.join("public"));
        assert_eq!(config.build.timeout_secs, 600);
    }

    #[test]
    fn refuses_existing_config() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("docship.toml"), "[build]\ntimeout_secs = 5\n").unwrap();

        let err = init_config(tmp.path()).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        let kept = fs::read_to_string(tmp.path().join("docship.toml")).unwrap();
        assert!(kept.contains("timeout_secs = 5"));
    }
}
