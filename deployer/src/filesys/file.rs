//! File operations

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::errors::DeployError;

/// A file wrapper with path
#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
}

impl File {
    /// Create a new file reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the file exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    /// Read file contents as string
    pub async fn read_string(&self) -> Result<String, DeployError> {
        fs::read_to_string(&self.path).await.map_err(|e| {
            DeployError::FilesystemError(format!("Failed to read {}: {}", self.path.display(), e))
        })
    }

    /// Read file as JSON
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, DeployError> {
        let contents = self.read_string().await?;
        let value = serde_json::from_str(&contents)?;
        Ok(value)
    }

    /// Write JSON to file atomically
    pub async fn write_json<T: Serialize>(&self, value: &T) -> Result<(), DeployError> {
        let contents = serde_json::to_string_pretty(value)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        self.write_atomic(contents.as_bytes()).await
    }

    /// Delete the file; a missing file is not an error
    pub async fn delete(&self) -> Result<(), DeployError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DeployError::FilesystemError(format!(
                "Failed to delete {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    /// Set file permissions to owner-read/write only (0o600) on Unix.
    ///
    /// A no-op on non-Unix platforms.
    pub async fn set_permissions_600(&self) -> Result<(), DeployError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let meta = fs::metadata(&self.path).await?;
            let mut perms = meta.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&self.path, perms).await?;
        }
        Ok(())
    }

    /// Atomic write using a temporary file
    pub async fn write_atomic(&self, contents: &[u8]) -> Result<(), DeployError> {
        let temp_path = self.path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}
