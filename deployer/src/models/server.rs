//! Server records

use serde::{Deserialize, Serialize};

use crate::models::project::ProjectId;
use crate::models::{uuid_id, AccountId};

uuid_id!(
    /// Server identifier
    ServerId
);

/// How to reach a server over SSH
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host name or IP address
    pub address: String,

    /// SSH port
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// Login user
    pub connect_as: String,
}

fn default_ssh_port() -> u16 {
    22
}

/// One remote deploy target belonging to a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    /// Unique server ID
    pub id: ServerId,

    /// Project this server belongs to
    pub project_id: ProjectId,

    /// Owning account
    pub owner_id: AccountId,

    /// Display name
    pub name: String,

    /// Connection endpoint
    pub endpoint: Endpoint,

    /// Deployment root on the server (holds `releases/`, `shared/`, `current`)
    pub project_path: String,

    /// Public half of the server's key pair, set once provisioning succeeds
    #[serde(default)]
    pub public_key: Option<String>,
}

impl Server {
    /// Create a server record that has not been provisioned yet
    pub fn new(
        project_id: ProjectId,
        owner_id: AccountId,
        name: impl Into<String>,
        endpoint: Endpoint,
        project_path: impl Into<String>,
    ) -> Self {
        Self {
            id: ServerId::new(),
            project_id,
            owner_id,
            name: name.into(),
            endpoint,
            project_path: project_path.into(),
            public_key: None,
        }
    }

    /// Apply mutable connection and path fields
    pub fn apply(&mut self, update: ServerUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(address) = update.address {
            self.endpoint.address = address;
        }
        if let Some(port) = update.port {
            self.endpoint.port = port;
        }
        if let Some(connect_as) = update.connect_as {
            self.endpoint.connect_as = connect_as;
        }
        if let Some(project_path) = update.project_path {
            self.project_path = project_path;
        }
    }
}

/// Partial update of a server record
///
/// Identity, ownership and the public key are not updatable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerUpdate {
    pub name: Option<String>,
    pub address: Option<String>,
    pub port: Option<u16>,
    pub connect_as: Option<String>,
    pub project_path: Option<String>,
}

/// Fields needed to create a server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewServer {
    pub name: String,
    pub endpoint: Endpoint,
    pub project_path: String,
}
