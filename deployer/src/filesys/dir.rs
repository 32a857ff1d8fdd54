//! Directory operations

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::DeployError;
use crate::filesys::file::File;

/// A directory wrapper with path
#[derive(Debug, Clone)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    /// Create a new directory reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the directory exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory (and parents); succeeds if it already exists
    pub async fn create(&self) -> Result<(), DeployError> {
        fs::create_dir_all(&self.path).await.map_err(|e| {
            DeployError::FilesystemError(format!(
                "Failed to create directory {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Delete the directory and all contents
    pub async fn delete(&self) -> Result<(), DeployError> {
        fs::remove_dir_all(&self.path).await.map_err(|e| {
            DeployError::FilesystemError(format!(
                "Failed to delete directory {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Restrict the directory to its owner (0o700) on Unix.
    ///
    /// A no-op on non-Unix platforms.
    pub async fn set_permissions_700(&self) -> Result<(), DeployError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o700)).await?;
        }
        Ok(())
    }

    /// Get a file within this directory
    pub fn file(&self, name: &str) -> File {
        File::new(self.path.join(name))
    }

    /// Get a subdirectory
    pub fn subdir(&self, name: &str) -> Dir {
        Dir::new(self.path.join(name))
    }
}
