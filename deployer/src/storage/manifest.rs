//! JSON manifest used by the command line as its record store

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::models::folder::LinkedFolder;
use crate::models::project::Project;
use crate::models::server::Server;

/// A project with its servers and linked folders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub project: Project,

    #[serde(default)]
    pub servers: Vec<Server>,

    #[serde(default)]
    pub folders: Vec<LinkedFolder>,
}

impl Manifest {
    /// Load and check a manifest file
    pub async fn load(file: &File) -> Result<Self, DeployError> {
        let manifest: Manifest = file.read_json().await?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Write the manifest back, e.g. after provisioning keys
    pub async fn save(&self, file: &File) -> Result<(), DeployError> {
        file.write_json(self).await
    }

    /// Every server and folder must belong to the manifest's project
    pub fn validate(&self) -> Result<(), DeployError> {
        for server in &self.servers {
            self.project.assert_owns_server(server)?;
        }
        for folder in &self.folders {
            self.project.assert_owns_folder(folder)?;
        }
        Ok(())
    }
}
