//! Local transport

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::process::Command;
use tracing::debug;

use crate::errors::DeployError;
use crate::remote::RemoteShell;

/// Performs shell operations on this host
#[derive(Debug, Clone, Default)]
pub struct LocalShell;

impl LocalShell {
    pub fn new() -> Self {
        Self
    }
}

fn io_error(op: &str, path: &Path, err: std::io::Error) -> DeployError {
    DeployError::FilesystemError(format!("{} {}: {}", op, path.display(), err))
}

#[async_trait]
impl RemoteShell for LocalShell {
    async fn create_dir_all(&self, path: &Path) -> Result<(), DeployError> {
        fs::create_dir_all(path)
            .await
            .map_err(|e| io_error("mkdir", path, e))
    }

    async fn is_dir(&self, path: &Path) -> Result<bool, DeployError> {
        match fs::metadata(path).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error("stat", path, e)),
        }
    }

    async fn read_link(&self, path: &Path) -> Result<Option<PathBuf>, DeployError> {
        match fs::read_link(path).await {
            Ok(target) => Ok(Some(target)),
            Err(e) if e.kind() == ErrorKind::NotFound || e.kind() == ErrorKind::InvalidInput => {
                Ok(None)
            }
            Err(e) => Err(io_error("readlink", path, e)),
        }
    }

    async fn symlink(&self, target: &Path, link: &Path) -> Result<(), DeployError> {
        #[cfg(unix)]
        {
            fs::symlink(target, link)
                .await
                .map_err(|e| io_error("symlink", link, e))
        }

        #[cfg(not(unix))]
        {
            let _ = target;
            Err(DeployError::FilesystemError(format!(
                "symlinks are not supported on this platform: {}",
                link.display()
            )))
        }
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<(), DeployError> {
        fs::rename(from, to)
            .await
            .map_err(|e| io_error("rename", from, e))
    }

    async fn remove_file(&self, path: &Path) -> Result<(), DeployError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("rm", path, e)),
        }
    }

    async fn remove_dir_all(&self, path: &Path) -> Result<(), DeployError> {
        match fs::remove_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("rm -r", path, e)),
        }
    }

    async fn list_dirs(&self, path: &Path) -> Result<Vec<String>, DeployError> {
        let mut entries = match fs::read_dir(path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error("ls", path, e)),
        };

        let mut dirs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error("ls", path, e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| io_error("stat", &entry.path(), e))?;
            if file_type.is_dir() {
                dirs.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    async fn exec(&self, program: &str, args: &[String]) -> Result<(), DeployError> {
        debug!("Running locally: {} {:?}", program, args);
        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| DeployError::FilesystemError(format!("Failed to run {}: {}", program, e)))?;

        if !output.status.success() {
            return Err(DeployError::FilesystemError(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}
