//! Deployment entry point for the administrative layer

use std::sync::Arc;

use tracing::{info, warn};

use crate::deploy::fleet::ServerFleet;
use crate::deploy::report::{DeploymentReport, DeploymentStatus, PruneReport};
use crate::deploy::{Cancellation, ReleaseRequest};
use crate::errors::DeployError;
use crate::folders::LinkedFolderRegistry;
use crate::keys::store::KeyStore;
use crate::models::project::Project;
use crate::models::release::{ReleaseId, ReleaseStatus};
use crate::models::server::Server;
use crate::tasks::{Task, TaskQueue};

/// Checks preconditions, runs the fleet and aggregates the outcome
pub struct DeploymentCoordinator {
    keys: Arc<KeyStore>,
    folders: Arc<LinkedFolderRegistry>,
    fleet: Arc<ServerFleet>,
    tasks: Arc<dyn TaskQueue>,
}

impl DeploymentCoordinator {
    pub fn new(
        keys: Arc<KeyStore>,
        folders: Arc<LinkedFolderRegistry>,
        fleet: Arc<ServerFleet>,
        tasks: Arc<dyn TaskQueue>,
    ) -> Self {
        Self {
            keys,
            folders,
            fleet,
            tasks,
        }
    }

    /// Association and credential checks shared by every entry point
    async fn preflight(&self, project: &Project, servers: &[Server]) -> Result<(), DeployError> {
        for server in servers {
            project.assert_owns_server(server)?;
        }
        if servers.is_empty() {
            return Err(DeployError::ValidationError(format!(
                "Project {} has no servers",
                project.id
            )));
        }
        for server in servers {
            if !self.keys.has_credentials(server).await {
                return Err(DeployError::MissingCredentialsError(server.id));
            }
        }
        Ok(())
    }

    /// Deploy a new release of `project` to all of `servers`
    ///
    /// Per-server failures land in the report; only precondition failures are
    /// returned as errors, before any server is touched.
    pub async fn deploy(
        &self,
        project: &Project,
        servers: &[Server],
        request: ReleaseRequest,
        cancel: Cancellation,
    ) -> Result<DeploymentReport, DeployError> {
        self.preflight(project, servers).await?;

        let folders = self.folders.list_for(project.id);
        info!(
            "Deploying project {} to {} server(s) with {} linked folder(s)",
            project.id,
            servers.len(),
            folders.len()
        );

        let outcomes = self.fleet.deploy(servers, &folders, &request, &cancel).await;
        let report = DeploymentReport::from_outcomes(project.id, outcomes);

        for server in &report.servers {
            if server.status == Some(ReleaseStatus::Active) {
                let task = Task::PruneReleases {
                    project_id: project.id,
                    server_id: server.server_id,
                };
                if let Err(e) = self.tasks.enqueue(task) {
                    warn!("Failed to schedule pruning for server {}: {}", server.server_id, e);
                }
            }
        }

        self.log_report("Deployment", &report);
        Ok(report)
    }

    /// Roll every server back to `target`, or to its previous release
    pub async fn rollback(
        &self,
        project: &Project,
        servers: &[Server],
        target: Option<ReleaseId>,
    ) -> Result<DeploymentReport, DeployError> {
        self.preflight(project, servers).await?;

        let outcomes = self.fleet.rollback(servers, target.as_ref()).await;
        let report = DeploymentReport::from_outcomes(project.id, outcomes);
        self.log_report("Rollback", &report);
        Ok(report)
    }

    /// Prune old releases on all of `servers` now
    pub async fn prune(
        &self,
        project: &Project,
        servers: &[Server],
    ) -> Result<Vec<PruneReport>, DeployError> {
        self.preflight(project, servers).await?;

        let outcomes = self.fleet.prune(servers, self.fleet.settings().keep).await;
        Ok(outcomes.into_iter().map(PruneReport::from).collect())
    }

    fn log_report(&self, action: &str, report: &DeploymentReport) {
        match report.status {
            DeploymentStatus::Success => info!(
                "{} of project {} succeeded on {} server(s)",
                action,
                report.project_id,
                report.servers.len()
            ),
            status => warn!(
                "{} of project {} {}: {}/{} server(s) succeeded",
                action,
                report.project_id,
                if status == DeploymentStatus::Partial {
                    "partially failed"
                } else {
                    "failed"
                },
                report.servers.iter().filter(|s| s.succeeded()).count(),
                report.servers.len()
            ),
        }
    }
}
