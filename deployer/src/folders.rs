//! Linked folder registry

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::info;

use crate::errors::DeployError;
use crate::models::folder::{normalize_folder_path, FolderId, LinkedFolder};
use crate::models::project::{Project, ProjectId};

/// Shared directories per project, in insertion order
///
/// Pure bookkeeping: nothing here touches a filesystem.
#[derive(Default)]
pub struct LinkedFolderRegistry {
    folders: RwLock<HashMap<ProjectId, Vec<LinkedFolder>>>,
}

impl LinkedFolderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the registry with existing records
    pub fn with_folders(folders: impl IntoIterator<Item = LinkedFolder>) -> Self {
        let mut map: HashMap<ProjectId, Vec<LinkedFolder>> = HashMap::new();
        for folder in folders {
            map.entry(folder.project_id).or_default().push(folder);
        }
        Self {
            folders: RwLock::new(map),
        }
    }

    /// Register a folder for a project
    pub fn add(&self, project: &Project, path: &str) -> Result<LinkedFolder, DeployError> {
        let path = normalize_folder_path(path)?;

        let mut folders = self.folders.write().unwrap_or_else(|e| e.into_inner());
        let entries = folders.entry(project.id).or_default();
        if entries.iter().any(|f| f.path == path) {
            return Err(DeployError::DuplicateFolderError { path });
        }

        let folder = LinkedFolder {
            id: FolderId::new(),
            project_id: project.id,
            path,
        };
        entries.push(folder.clone());

        info!("Linked folder '{}' added to project {}", folder.path, project.id);
        Ok(folder)
    }

    /// Drop a folder from the registry; its directory on the servers is kept
    pub fn remove(&self, project: &Project, folder_id: FolderId) -> Result<LinkedFolder, DeployError> {
        let mut folders = self.folders.write().unwrap_or_else(|e| e.into_inner());

        if let Some(entries) = folders.get_mut(&project.id) {
            if let Some(index) = entries.iter().position(|f| f.id == folder_id) {
                let folder = entries.remove(index);
                info!("Linked folder '{}' removed from project {}", folder.path, project.id);
                return Ok(folder);
            }
        }

        if let Some(folder) = folders.values().flatten().find(|f| f.id == folder_id) {
            project.assert_owns_folder(folder)?;
        }
        Err(DeployError::NotFound(format!("linked folder {}", folder_id)))
    }

    /// Folders of a project, in the order they were added
    pub fn list_for(&self, project_id: ProjectId) -> Vec<LinkedFolder> {
        let folders = self.folders.read().unwrap_or_else(|e| e.into_inner());
        folders.get(&project_id).cloned().unwrap_or_default()
    }
}
