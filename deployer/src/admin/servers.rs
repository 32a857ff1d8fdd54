//! Server administration

use std::sync::Arc;

use tracing::info;

use crate::admin::authz::{authorize, Action, Actor, AuthorizationCheck, Resource};
use crate::errors::DeployError;
use crate::keys::store::KeyStore;
use crate::models::project::Project;
use crate::models::server::{NewServer, Server, ServerId, ServerUpdate};
use crate::storage::records::ServerRepository;

/// Show, create, update and delete the servers of a project
pub struct ServerService {
    records: Arc<dyn ServerRepository>,
    keys: Arc<KeyStore>,
    authz: Arc<dyn AuthorizationCheck>,
}

impl ServerService {
    pub fn new(
        records: Arc<dyn ServerRepository>,
        keys: Arc<KeyStore>,
        authz: Arc<dyn AuthorizationCheck>,
    ) -> Self {
        Self {
            records,
            keys,
            authz,
        }
    }

    /// Load a server reached through `project`
    async fn load(&self, project: &Project, server_id: ServerId) -> Result<Server, DeployError> {
        let server = self
            .records
            .get(server_id)
            .await?
            .ok_or_else(|| DeployError::NotFound(format!("server {}", server_id)))?;
        project.assert_owns_server(&server)?;
        Ok(server)
    }

    pub async fn list(&self, actor: &Actor, project: &Project) -> Result<Vec<Server>, DeployError> {
        authorize(self.authz.as_ref(), actor, Action::View, Resource::Project(project))?;
        self.records.list_for_project(project.id).await
    }

    pub async fn show(
        &self,
        actor: &Actor,
        project: &Project,
        server_id: ServerId,
    ) -> Result<Server, DeployError> {
        let server = self.load(project, server_id).await?;
        authorize(self.authz.as_ref(), actor, Action::View, Resource::Server(&server))?;
        Ok(server)
    }

    /// Create a server and provision its key pair before returning
    ///
    /// If provisioning fails the record stays, without a public key, and the
    /// error is returned.
    pub async fn create(
        &self,
        actor: &Actor,
        project: &Project,
        new: NewServer,
    ) -> Result<Server, DeployError> {
        authorize(self.authz.as_ref(), actor, Action::Create, Resource::Project(project))?;
        validate(&new)?;

        let server = Server::new(
            project.id,
            project.owner_id,
            new.name,
            new.endpoint,
            new.project_path,
        );
        let mut server = self.records.insert(server).await?;
        info!("Created server {} ({}) in project {}", server.id, server.name, project.id);

        self.keys.provision(&mut server).await?;
        Ok(server)
    }

    pub async fn update(
        &self,
        actor: &Actor,
        project: &Project,
        server_id: ServerId,
        update: ServerUpdate,
    ) -> Result<Server, DeployError> {
        let mut server = self.load(project, server_id).await?;
        authorize(self.authz.as_ref(), actor, Action::Update, Resource::Server(&server))?;

        server.apply(update);
        let server = self.records.update(server).await?;
        info!("Updated server {}", server.id);
        Ok(server)
    }

    /// Delete the record, then schedule removal of its key pair
    ///
    /// Key retirement runs later; its outcome never reaches the caller.
    pub async fn destroy(
        &self,
        actor: &Actor,
        project: &Project,
        server_id: ServerId,
    ) -> Result<(), DeployError> {
        let server = self.load(project, server_id).await?;
        authorize(self.authz.as_ref(), actor, Action::Delete, Resource::Server(&server))?;

        self.records.delete(server.id).await?;
        info!("Deleted server {}", server.id);

        self.keys.retire(server.id);
        Ok(())
    }
}

fn validate(new: &NewServer) -> Result<(), DeployError> {
    if new.name.trim().is_empty() {
        return Err(DeployError::ValidationError("Server name is required".to_string()));
    }
    if new.endpoint.address.trim().is_empty() {
        return Err(DeployError::ValidationError("Server address is required".to_string()));
    }
    if new.endpoint.connect_as.trim().is_empty() {
        return Err(DeployError::ValidationError("Login user is required".to_string()));
    }
    if !new.project_path.starts_with('/') {
        return Err(DeployError::ValidationError(
            "Project path must be absolute".to_string(),
        ));
    }
    Ok(())
}
