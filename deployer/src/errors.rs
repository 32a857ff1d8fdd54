//! Error types for the deployer

use thiserror::Error;

use crate::models::release::{ReleaseId, ReleaseStatus};
use crate::models::server::ServerId;

/// Main error type for the deployer
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Filesystem error: {0}")]
    FilesystemError(String),

    #[error("Key generation error: {0}")]
    KeyGenerationError(String),

    #[error("Server {0} has no provisioned key pair")]
    MissingCredentialsError(ServerId),

    #[error("Linked folder '{path}' is already registered for this project")]
    DuplicateFolderError { path: String },

    #[error("{resource} does not belong to project {project_id}")]
    AssociationMismatchError { resource: String, project_id: String },

    #[error("Release {release_id} failed while {state} on server {server_id}: {source}")]
    TransitionError {
        server_id: ServerId,
        release_id: ReleaseId,
        state: ReleaseStatus,
        #[source]
        source: Box<DeployError>,
    },

    #[error("Timed out: {0}")]
    TimeoutError(String),

    #[error("Server {0} is already running a release pipeline")]
    ServerBusyError(ServerId),

    #[error("Deployment cancelled")]
    Cancelled,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Queue error: {0}")]
    QueueError(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeployError {
    /// True when the failure was a timeout rather than a hard error.
    ///
    /// Only used for operator diagnostics; the release state machine treats
    /// both the same way.
    pub fn is_timeout(&self) -> bool {
        match self {
            DeployError::TimeoutError(_) => true,
            DeployError::TransitionError { source, .. } => source.is_timeout(),
            _ => false,
        }
    }

    /// Short description safe to hand to the administrative layer.
    ///
    /// Carries the error kind and, for pipeline failures, the state the
    /// release failed in. Raw filesystem paths and command output stay in the
    /// logs.
    pub fn summary(&self) -> String {
        match self {
            DeployError::FilesystemError(_) => "filesystem operation failed".to_string(),
            DeployError::KeyGenerationError(_) => "key generation failed".to_string(),
            DeployError::TransitionError { state, source, .. } => {
                format!("failed while {}: {}", state, source.summary())
            }
            DeployError::TimeoutError(_) => "remote operation timed out".to_string(),
            DeployError::JsonError(_) => "invalid data".to_string(),
            DeployError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<std::io::Error> for DeployError {
    fn from(err: std::io::Error) -> Self {
        DeployError::FilesystemError(err.to_string())
    }
}

impl From<anyhow::Error> for DeployError {
    fn from(err: anyhow::Error) -> Self {
        DeployError::Internal(err.to_string())
    }
}
