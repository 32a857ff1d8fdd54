//! Linked folder records

use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;
use crate::models::project::ProjectId;
use crate::models::uuid_id;

uuid_id!(
    /// Linked folder identifier
    FolderId
);

/// A project-relative directory preserved across releases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedFolder {
    /// Unique folder ID
    pub id: FolderId,

    /// Project this folder belongs to
    pub project_id: ProjectId,

    /// Path relative to the release root, e.g. `storage/uploads`
    pub path: String,
}

impl LinkedFolder {
    /// Number of path components, used to compute relative link targets
    pub fn depth(&self) -> usize {
        Path::new(&self.path).components().count()
    }
}

/// Normalize a linked folder path and reject anything outside the release tree
pub fn normalize_folder_path(raw: &str) -> Result<String, DeployError> {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Err(DeployError::ValidationError(
            "Linked folder path must not be empty".to_string(),
        ));
    }
    if raw.trim().starts_with('/') {
        return Err(DeployError::ValidationError(format!(
            "Linked folder path must be relative: {}",
            raw
        )));
    }

    let mut parts = Vec::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => {
                return Err(DeployError::ValidationError(format!(
                    "Path traversal not allowed in linked folder: {}",
                    raw
                )));
            }
        }
    }

    if parts.is_empty() {
        return Err(DeployError::ValidationError(
            "Linked folder path must not be empty".to_string(),
        ));
    }

    Ok(parts.join("/"))
}
