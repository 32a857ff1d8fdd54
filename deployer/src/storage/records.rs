//! Server record store

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::errors::DeployError;
use crate::models::project::ProjectId;
use crate::models::server::{Server, ServerId};

/// Persistence boundary for server records
///
/// Implemented by the administrative layer's database; the core only needs
/// these operations.
#[async_trait]
pub trait ServerRepository: Send + Sync {
    /// Insert a new server record
    async fn insert(&self, server: Server) -> Result<Server, DeployError>;

    /// Fetch a server by ID
    async fn get(&self, id: ServerId) -> Result<Option<Server>, DeployError>;

    /// Replace an existing server record
    async fn update(&self, server: Server) -> Result<Server, DeployError>;

    /// Persist a freshly generated public key
    async fn set_public_key(&self, id: ServerId, public_key: &str) -> Result<(), DeployError>;

    /// Remove a server record, returning it if it existed
    async fn delete(&self, id: ServerId) -> Result<Option<Server>, DeployError>;

    /// All servers of a project
    async fn list_for_project(&self, project_id: ProjectId) -> Result<Vec<Server>, DeployError>;
}

/// In-memory server record store
#[derive(Default)]
pub struct MemoryServerRepository {
    servers: RwLock<HashMap<ServerId, Server>>,
}

impl MemoryServerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing records
    pub fn with_servers(servers: impl IntoIterator<Item = Server>) -> Self {
        let map = servers.into_iter().map(|s| (s.id, s)).collect();
        Self {
            servers: RwLock::new(map),
        }
    }

    /// Snapshot of all records
    pub fn all(&self) -> Vec<Server> {
        let servers = self.servers.read().unwrap_or_else(|e| e.into_inner());
        servers.values().cloned().collect()
    }
}

#[async_trait]
impl ServerRepository for MemoryServerRepository {
    async fn insert(&self, server: Server) -> Result<Server, DeployError> {
        let mut servers = self.servers.write().unwrap_or_else(|e| e.into_inner());
        if servers.contains_key(&server.id) {
            return Err(DeployError::ValidationError(format!(
                "Server {} already exists",
                server.id
            )));
        }
        servers.insert(server.id, server.clone());
        Ok(server)
    }

    async fn get(&self, id: ServerId) -> Result<Option<Server>, DeployError> {
        let servers = self.servers.read().unwrap_or_else(|e| e.into_inner());
        Ok(servers.get(&id).cloned())
    }

    async fn update(&self, server: Server) -> Result<Server, DeployError> {
        let mut servers = self.servers.write().unwrap_or_else(|e| e.into_inner());
        match servers.get_mut(&server.id) {
            Some(existing) => {
                *existing = server.clone();
                Ok(server)
            }
            None => Err(DeployError::NotFound(format!("server {}", server.id))),
        }
    }

    async fn set_public_key(&self, id: ServerId, public_key: &str) -> Result<(), DeployError> {
        let mut servers = self.servers.write().unwrap_or_else(|e| e.into_inner());
        match servers.get_mut(&id) {
            Some(server) => {
                server.public_key = Some(public_key.to_string());
                Ok(())
            }
            None => Err(DeployError::NotFound(format!("server {}", id))),
        }
    }

    async fn delete(&self, id: ServerId) -> Result<Option<Server>, DeployError> {
        let mut servers = self.servers.write().unwrap_or_else(|e| e.into_inner());
        Ok(servers.remove(&id))
    }

    async fn list_for_project(&self, project_id: ProjectId) -> Result<Vec<Server>, DeployError> {
        let servers = self.servers.read().unwrap_or_else(|e| e.into_inner());
        let mut matching: Vec<Server> = servers
            .values()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(matching)
    }
}
