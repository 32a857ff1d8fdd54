//! Project records

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;
use crate::models::folder::LinkedFolder;
use crate::models::server::Server;
use crate::models::{uuid_id, AccountId};

uuid_id!(
    /// Project identifier
    ProjectId
);

/// A deployment target group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Unique project ID
    pub id: ProjectId,

    /// Owning account
    pub owner_id: AccountId,

    /// Display name
    pub name: String,
}

impl Project {
    /// Create a new project
    pub fn new(owner_id: AccountId, name: impl Into<String>) -> Self {
        Self {
            id: ProjectId::new(),
            owner_id,
            name: name.into(),
        }
    }

    /// Fail unless the server was reached through this project
    pub fn assert_owns_server(&self, server: &Server) -> Result<(), DeployError> {
        if server.project_id != self.id {
            return Err(DeployError::AssociationMismatchError {
                resource: format!("server {}", server.id),
                project_id: self.id.to_string(),
            });
        }
        Ok(())
    }

    /// Fail unless the linked folder was reached through this project
    pub fn assert_owns_folder(&self, folder: &LinkedFolder) -> Result<(), DeployError> {
        if folder.project_id != self.id {
            return Err(DeployError::AssociationMismatchError {
                resource: format!("linked folder {}", folder.id),
                project_id: self.id.to_string(),
            });
        }
        Ok(())
    }
}
