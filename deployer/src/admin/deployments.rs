//! Deployment actions on behalf of an account

use std::sync::Arc;

use crate::admin::authz::{authorize, Action, Actor, AuthorizationCheck, Resource};
use crate::deploy::coordinator::DeploymentCoordinator;
use crate::deploy::report::{DeploymentReport, PruneReport};
use crate::deploy::{Cancellation, ReleaseRequest};
use crate::errors::DeployError;
use crate::models::project::Project;
use crate::models::release::ReleaseId;
use crate::models::server::Server;
use crate::storage::records::ServerRepository;

/// Runs deploy, rollback and prune across every server of a project
pub struct DeploymentService {
    records: Arc<dyn ServerRepository>,
    coordinator: Arc<DeploymentCoordinator>,
    authz: Arc<dyn AuthorizationCheck>,
}

impl DeploymentService {
    pub fn new(
        records: Arc<dyn ServerRepository>,
        coordinator: Arc<DeploymentCoordinator>,
        authz: Arc<dyn AuthorizationCheck>,
    ) -> Self {
        Self {
            records,
            coordinator,
            authz,
        }
    }

    async fn servers(&self, actor: &Actor, project: &Project) -> Result<Vec<Server>, DeployError> {
        authorize(self.authz.as_ref(), actor, Action::Deploy, Resource::Project(project))?;
        self.records.list_for_project(project.id).await
    }

    pub async fn deploy(
        &self,
        actor: &Actor,
        project: &Project,
        request: ReleaseRequest,
        cancel: Cancellation,
    ) -> Result<DeploymentReport, DeployError> {
        let servers = self.servers(actor, project).await?;
        self.coordinator.deploy(project, &servers, request, cancel).await
    }

    pub async fn rollback(
        &self,
        actor: &Actor,
        project: &Project,
        target: Option<ReleaseId>,
    ) -> Result<DeploymentReport, DeployError> {
        let servers = self.servers(actor, project).await?;
        self.coordinator.rollback(project, &servers, target).await
    }

    pub async fn prune(&self, actor: &Actor, project: &Project) -> Result<Vec<PruneReport>, DeployError> {
        let servers = self.servers(actor, project).await?;
        self.coordinator.prune(project, &servers).await
    }
}
