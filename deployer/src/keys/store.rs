//! Key store: provisioning and retirement of per-server key pairs

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::keys::generator::KeyGenerator;
use crate::keys::{PublicKey, PRIVATE_KEY_FILE, PUBLIC_KEY_FILE};
use crate::models::server::{Server, ServerId};
use crate::storage::records::ServerRepository;
use crate::tasks::{Task, TaskQueue};

/// Owns the `<key_root>/<server_id>/` directories
///
/// The private key never leaves its directory: callers only ever get its
/// path (for the ssh transport) or the public half.
pub struct KeyStore {
    root: Dir,
    generator: Arc<dyn KeyGenerator>,
    comment: String,
    records: Arc<dyn ServerRepository>,
    tasks: Arc<dyn TaskQueue>,
}

impl KeyStore {
    /// Create a key store rooted at `root`
    pub fn new(
        root: Dir,
        generator: Arc<dyn KeyGenerator>,
        comment: impl Into<String>,
        records: Arc<dyn ServerRepository>,
        tasks: Arc<dyn TaskQueue>,
    ) -> Self {
        Self {
            root,
            generator,
            comment: comment.into(),
            records,
            tasks,
        }
    }

    /// Key directory of one server
    pub fn server_dir(&self, server_id: ServerId) -> Dir {
        self.root.subdir(&server_id.to_string())
    }

    /// Location of the private key, for handing to the ssh client
    pub fn private_key_path(&self, server_id: ServerId) -> PathBuf {
        self.server_dir(server_id).file(PRIVATE_KEY_FILE).path().to_path_buf()
    }

    /// Generate a key pair for `server` and store the public half on its record
    ///
    /// A leftover directory from an earlier server with the same ID is reused.
    pub async fn provision(&self, server: &mut Server) -> Result<PublicKey, DeployError> {
        let dir = self.server_dir(server.id);
        dir.create().await?;
        dir.set_permissions_700().await?;

        let private_file = dir.file(PRIVATE_KEY_FILE);
        let public_file = dir.file(PUBLIC_KEY_FILE);

        // ssh-keygen refuses to overwrite without a prompt
        private_file.delete().await?;
        public_file.delete().await?;

        self.generator
            .generate(dir.path(), PRIVATE_KEY_FILE, &self.comment)
            .await?;

        if !private_file.exists().await || !public_file.exists().await {
            return Err(DeployError::KeyGenerationError(format!(
                "Key generator did not produce a key pair for server {}",
                server.id
            )));
        }
        private_file.set_permissions_600().await?;

        let public_key = PublicKey::parse(&public_file.read_string().await?)?;
        self.records
            .set_public_key(server.id, public_key.as_str())
            .await?;
        server.public_key = Some(public_key.as_str().to_string());

        public_file.delete().await?;

        info!(
            "Provisioned key pair for server {} ({})",
            server.id,
            public_key.fingerprint()
        );
        Ok(public_key)
    }

    /// Provision only if the server cannot authenticate yet
    ///
    /// A server with working credentials keeps its key pair.
    pub async fn ensure(&self, server: &mut Server) -> Result<PublicKey, DeployError> {
        if self.has_credentials(server).await {
            if let Some(existing) = server.public_key.as_deref() {
                debug!("Server {} already has a key pair", server.id);
                return PublicKey::parse(existing);
            }
        }
        self.provision(server).await
    }

    /// Whether the server can authenticate: public key on record, private key on disk
    pub async fn has_credentials(&self, server: &Server) -> bool {
        server.public_key.is_some()
            && self
                .server_dir(server.id)
                .file(PRIVATE_KEY_FILE)
                .exists()
                .await
    }

    /// Schedule removal of the server's key directory
    ///
    /// Never fails the caller; only the server ID is captured.
    pub fn retire(&self, server_id: ServerId) {
        if let Err(e) = self.tasks.enqueue(Task::RetireKeys { server_id }) {
            warn!("Failed to schedule key retirement for server {}: {}", server_id, e);
        }
    }

    /// Delete the server's key directory, logging rather than returning failures
    pub async fn purge(&self, server_id: ServerId) {
        let dir = self.server_dir(server_id);
        match dir.delete().await {
            Ok(()) => info!("Removed key pair of server {}", server_id),
            Err(e) => warn!("Failed to remove key pair of server {}: {}", server_id, e),
        }
    }
}
