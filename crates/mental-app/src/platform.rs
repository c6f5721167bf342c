//! Platform directory resolution.

use std::io;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "mental";

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("could not determine OS configuration directory")]
    NoConfigDir,

    #[error("platform I/O error: {0}")]
    Io(#[from] io::Error),
}

/// OS-specific directories for the application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlatformDirs {
    /// Holds `config.ron`.
    pub config_dir: PathBuf,
    /// JSON log files in debug builds.
    pub log_dir: PathBuf,
}

impl PlatformDirs {
    /// Resolve directories without creating them.
    pub fn resolve() -> Result<Self, PlatformError> {
        let base = dirs::config_dir().ok_or(PlatformError::NoConfigDir)?;
        Ok(Self::resolve_with_root(&base))
    }

    /// Directories under a custom base, e.g. the `--config` argument.
    pub fn resolve_with_root(root: &Path) -> Self {
        let app_dir = root.join(APP_NAME);
        Self {
            config_dir: app_dir.clone(),
            log_dir: app_dir.join("logs"),
        }
    }

    /// Create every directory on disk.
    pub fn create_all(&self) -> Result<(), PlatformError> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_with_root() {
        let dirs = PlatformDirs::resolve_with_root(Path::new("/tmp/root"));
        assert_eq!(dirs.config_dir, PathBuf::from("/tmp/root/mental"));
        assert_eq!(dirs.log_dir, PathBuf::from("/tmp/root/mental/logs"));
    }

    #[test]
    fn test_create_all() {
        let temp = tempfile::tempdir().unwrap();
        let dirs = PlatformDirs::resolve_with_root(temp.path());
        dirs.create_all().unwrap();
        assert!(dirs.config_dir.is_dir());
        assert!(dirs.log_dir.is_dir());
    }

    #[test]
    fn test_resolve_uses_app_name() {
        if let Ok(dirs) = PlatformDirs::resolve() {
            assert!(dirs.config_dir.ends_with(APP_NAME));
        }
    }
}
