//! Linked folder administration

use std::sync::Arc;

use crate::admin::authz::{authorize, Action, Actor, AuthorizationCheck, Resource};
use crate::errors::DeployError;
use crate::folders::LinkedFolderRegistry;
use crate::models::folder::{FolderId, LinkedFolder};
use crate::models::project::Project;

/// List, add and remove the linked folders of a project
pub struct FolderService {
    registry: Arc<LinkedFolderRegistry>,
    authz: Arc<dyn AuthorizationCheck>,
}

impl FolderService {
    pub fn new(registry: Arc<LinkedFolderRegistry>, authz: Arc<dyn AuthorizationCheck>) -> Self {
        Self { registry, authz }
    }

    pub fn list(&self, actor: &Actor, project: &Project) -> Result<Vec<LinkedFolder>, DeployError> {
        authorize(self.authz.as_ref(), actor, Action::View, Resource::Project(project))?;
        Ok(self.registry.list_for(project.id))
    }

    pub fn add(&self, actor: &Actor, project: &Project, path: &str) -> Result<LinkedFolder, DeployError> {
        authorize(self.authz.as_ref(), actor, Action::Update, Resource::Project(project))?;
        self.registry.add(project, path)
    }

    /// Stop linking a folder into new releases; its shared data stays put
    pub fn remove(
        &self,
        actor: &Actor,
        project: &Project,
        folder_id: FolderId,
    ) -> Result<LinkedFolder, DeployError> {
        if let Some(folder) = self
            .registry
            .list_for(project.id)
            .iter()
            .find(|f| f.id == folder_id)
        {
            authorize(
                self.authz.as_ref(),
                actor,
                Action::Delete,
                Resource::Folder { project, folder },
            )?;
        } else {
            authorize(self.authz.as_ref(), actor, Action::Update, Resource::Project(project))?;
        }
        self.registry.remove(project, folder_id)
    }
}
