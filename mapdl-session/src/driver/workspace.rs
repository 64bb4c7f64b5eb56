//! Working directory provisioning.

use std::path::{Path, PathBuf};

use chrono::Local;
use log::{debug, warn};

use crate::error::{DriverError, Result};

/// Prefix of generated session directories.
const SESSION_DIR_PREFIX: &str = "session_";

/// Directory the engine runs in, and whether it is removed on teardown.
#[derive(Debug, Clone)]
pub struct Workspace {
    path: PathBuf,
    cleanup: bool,
}

impl Workspace {
    /// Use an existing directory. It is never removed.
    pub fn existing(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_dir() {
            return Err(DriverError::InvalidConfig {
                message: format!("the folder {} doesn't exist", path.display()),
            }
            .into());
        }
        let path = absolute(&path)?;
        Ok(Self {
            path,
            cleanup: false,
        })
    }

    /// Create `<base>/session_<YYYYMMDDHHMMSS>`.
    ///
    /// Two sessions started in the same second get `_1`, `_2`, ... suffixes so
    /// that each directory belongs to exactly one session.
    pub fn create(base: &Path, cleanup: bool) -> Result<Self> {
        let base = absolute(base)?;
        std::fs::create_dir_all(&base).map_err(|e| DriverError::filesystem(&base, e))?;

        let stem = format!(
            "{}{}",
            SESSION_DIR_PREFIX,
            Local::now().format("%Y%m%d%H%M%S")
        );
        let mut attempt = 0usize;
        loop {
            let name = match attempt {
                0 => stem.clone(),
                n => format!("{stem}_{n}"),
            };
            let path = base.join(name);
            match std::fs::create_dir(&path) {
                Ok(()) => {
                    debug!("created working directory {}", path.display());
                    return Ok(Self { path, cleanup });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(DriverError::filesystem(&path, e).into()),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the directory is removed on teardown.
    pub fn cleanup(&self) -> bool {
        self.cleanup
    }

    /// Remove the directory if cleanup is on. Failures are logged, never raised.
    pub fn release(&self) {
        if !self.cleanup {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("removed working directory {}", self.path.display()),
            Err(e) => warn!(
                "could not remove working directory {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| DriverError::filesystem(path, e).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_create_names_directory_by_timestamp() {
        let base = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(base.path(), true).unwrap();

        let name = workspace.path().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("session_"));
        assert_eq!(name.len(), "session_".len() + 14);
        assert!(workspace.path().is_dir());
        assert!(workspace.path().is_absolute());
    }

    #[test]
    fn test_same_second_sessions_get_distinct_directories() {
        let base = tempfile::tempdir().unwrap();
        let first = Workspace::create(base.path(), false).unwrap();
        let second = Workspace::create(base.path(), false).unwrap();
        let third = Workspace::create(base.path(), false).unwrap();

        assert_ne!(first.path(), second.path());
        assert_ne!(second.path(), third.path());
    }

    #[test]
    fn test_release_honours_cleanup() {
        let base = tempfile::tempdir().unwrap();
        let kept = Workspace::create(base.path(), false).unwrap();
        let removed = Workspace::create(base.path(), true).unwrap();

        kept.release();
        removed.release();
        assert!(kept.path().is_dir());
        assert!(!removed.path().exists());

        // Releasing twice only logs.
        removed.release();
    }

    #[test]
    fn test_existing_folder_is_never_cleaned() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::existing(dir.path()).unwrap();
        assert!(!workspace.cleanup());
        workspace.release();
        assert!(dir.path().is_dir());
    }

    #[test]
    fn test_missing_folder_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = Workspace::existing(dir.path().join("nope")).unwrap_err();
        assert!(matches!(
            err,
            Error::Driver(DriverError::InvalidConfig { .. })
        ));
    }
}
