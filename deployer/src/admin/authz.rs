//! Authorization capability

use crate::errors::DeployError;
use crate::models::folder::LinkedFolder;
use crate::models::project::Project;
use crate::models::server::Server;
use crate::models::AccountId;

/// The account performing an administrative action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub account_id: AccountId,
}

impl Actor {
    pub fn new(account_id: AccountId) -> Self {
        Self { account_id }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    Create,
    Update,
    Delete,
    Deploy,
}

/// What an action is performed on
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    Project(&'a Project),
    Server(&'a Server),
    Folder {
        project: &'a Project,
        folder: &'a LinkedFolder,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// Decides whether an actor may perform an action on a resource
///
/// Supplied by the administrative layer; the core only asks.
pub trait AuthorizationCheck: Send + Sync {
    fn check(&self, actor: &Actor, action: Action, resource: Resource<'_>) -> Decision;
}

/// Default policy: only the owning account may do anything
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnerPolicy;

impl AuthorizationCheck for OwnerPolicy {
    fn check(&self, actor: &Actor, _action: Action, resource: Resource<'_>) -> Decision {
        let owner = match resource {
            Resource::Project(project) => project.owner_id,
            Resource::Server(server) => server.owner_id,
            Resource::Folder { project, .. } => project.owner_id,
        };
        if owner == actor.account_id {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

/// Ask `check`, turning a denial into `Unauthorized`
pub fn authorize(
    check: &dyn AuthorizationCheck,
    actor: &Actor,
    action: Action,
    resource: Resource<'_>,
) -> Result<(), DeployError> {
    match check.check(actor, action, resource) {
        Decision::Allow => Ok(()),
        Decision::Deny => Err(DeployError::Unauthorized(format!(
            "{:?} not permitted for account {}",
            action, actor.account_id
        ))),
    }
}
