//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Local storage layout for the deployer
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Default root for per-server key directories
    pub fn keys_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("keys"))
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), DeployError> {
        self.keys_dir().create().await?;
        self.keys_dir().set_permissions_700().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        #[cfg(target_os = "linux")]
        let base_dir = PathBuf::from("/etc/deployer");

        #[cfg(not(target_os = "linux"))]
        let base_dir = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".deployer");

        Self::new(base_dir)
    }
}
