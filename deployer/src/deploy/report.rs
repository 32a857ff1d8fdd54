//! Per-server outcomes and their aggregation

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;
use crate::models::project::ProjectId;
use crate::models::release::{Release, ReleaseId, ReleaseStatus};
use crate::models::server::ServerId;

/// Result of one fleet operation on one server
#[derive(Debug)]
pub struct ServerOutcome<T> {
    pub server_id: ServerId,
    pub result: Result<T, DeployError>,
}

/// Overall result of a deployment or rollback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    /// Every server reached the requested release
    Success,

    /// Some servers did
    Partial,

    /// None did
    Failed,
}

/// What happened on one server, safe to show an administrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerReport {
    pub server_id: ServerId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_id: Option<ReleaseId>,

    /// Final release status on this server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ReleaseStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_in: Option<ReleaseStatus>,

    /// Path-free error summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServerReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

impl From<ServerOutcome<Release>> for ServerReport {
    fn from(outcome: ServerOutcome<Release>) -> Self {
        match outcome.result {
            Ok(release) => ServerReport {
                server_id: outcome.server_id,
                release_id: Some(release.id),
                status: Some(release.status),
                failed_in: None,
                error: None,
            },
            Err(err) => {
                let (release_id, status, failed_in) = match &err {
                    DeployError::TransitionError {
                        release_id, state, ..
                    } => (
                        Some(release_id.clone()),
                        Some(ReleaseStatus::Failed),
                        Some(*state),
                    ),
                    _ => (None, None, None),
                };
                ServerReport {
                    server_id: outcome.server_id,
                    release_id,
                    status,
                    failed_in,
                    error: Some(err.summary()),
                }
            }
        }
    }
}

/// Aggregated outcome across a project's servers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub project_id: ProjectId,
    pub status: DeploymentStatus,
    pub servers: Vec<ServerReport>,
}

impl DeploymentReport {
    pub fn from_outcomes(project_id: ProjectId, outcomes: Vec<ServerOutcome<Release>>) -> Self {
        let servers: Vec<ServerReport> = outcomes.into_iter().map(ServerReport::from).collect();
        let succeeded = servers.iter().filter(|s| s.succeeded()).count();

        let status = if succeeded == servers.len() && !servers.is_empty() {
            DeploymentStatus::Success
        } else if succeeded > 0 {
            DeploymentStatus::Partial
        } else {
            DeploymentStatus::Failed
        };

        Self {
            project_id,
            status,
            servers,
        }
    }

    pub fn server(&self, server_id: ServerId) -> Option<&ServerReport> {
        self.servers.iter().find(|s| s.server_id == server_id)
    }
}

/// Releases removed from one server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruneReport {
    pub server_id: ServerId,
    pub purged: Vec<ReleaseId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ServerOutcome<Vec<ReleaseId>>> for PruneReport {
    fn from(outcome: ServerOutcome<Vec<ReleaseId>>) -> Self {
        match outcome.result {
            Ok(purged) => PruneReport {
                server_id: outcome.server_id,
                purged,
                error: None,
            },
            Err(err) => PruneReport {
                server_id: outcome.server_id,
                purged: Vec::new(),
                error: Some(err.summary()),
            },
        }
    }
}
