//! Remote execution boundary
//!
//! Release pipelines only ever talk to a server through [`RemoteShell`]. The
//! SSH transport issues one `ssh` invocation per operation; the local
//! transport performs the same operations on this host.

pub mod local;
pub mod ssh;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::DeployError;
use crate::keys::store::KeyStore;
use crate::models::server::Server;
use crate::remote::local::LocalShell;
use crate::remote::ssh::SshShell;
use crate::storage::settings::{SshSettings, Transport};

/// Filesystem and command primitives on one server
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// `mkdir -p`
    async fn create_dir_all(&self, path: &Path) -> Result<(), DeployError>;

    /// Whether `path` is a directory (following symlinks)
    async fn is_dir(&self, path: &Path) -> Result<bool, DeployError>;

    /// Target of a symlink, `None` if `path` is missing or not a symlink
    async fn read_link(&self, path: &Path) -> Result<Option<PathBuf>, DeployError>;

    /// Create a symlink at `link` pointing to `target`
    async fn symlink(&self, target: &Path, link: &Path) -> Result<(), DeployError>;

    /// Rename `from` over `to`, replacing `to` in one step
    async fn rename(&self, from: &Path, to: &Path) -> Result<(), DeployError>;

    /// Remove a file or symlink; a missing path is not an error
    async fn remove_file(&self, path: &Path) -> Result<(), DeployError>;

    /// Remove a directory tree; a missing path is not an error
    async fn remove_dir_all(&self, path: &Path) -> Result<(), DeployError>;

    /// Names of the sub-directories of `path`; empty if `path` does not exist
    async fn list_dirs(&self, path: &Path) -> Result<Vec<String>, DeployError>;

    /// Run a program to completion, failing on a non-zero exit status
    async fn exec(&self, program: &str, args: &[String]) -> Result<(), DeployError>;
}

/// Opens a [`RemoteShell`] for a server
pub trait ShellConnector: Send + Sync {
    fn connect(&self, server: &Server) -> Result<Arc<dyn RemoteShell>, DeployError>;
}

/// Connector choosing the transport from settings
pub struct TransportConnector {
    transport: Transport,
    ssh: SshSettings,
    keys: Arc<KeyStore>,
}

impl TransportConnector {
    pub fn new(transport: Transport, ssh: SshSettings, keys: Arc<KeyStore>) -> Self {
        Self {
            transport,
            ssh,
            keys,
        }
    }
}

impl ShellConnector for TransportConnector {
    fn connect(&self, server: &Server) -> Result<Arc<dyn RemoteShell>, DeployError> {
        match self.transport {
            Transport::Local => Ok(Arc::new(LocalShell::new())),
            Transport::Ssh => Ok(Arc::new(SshShell::new(
                server.endpoint.clone(),
                self.keys.private_key_path(server.id),
                self.ssh.clone(),
            ))),
        }
    }
}
