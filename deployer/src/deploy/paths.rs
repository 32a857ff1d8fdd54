//! Release layout under a server's project path

use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

use crate::models::folder::LinkedFolder;
use crate::models::release::ReleaseId;

const RELEASES_DIR: &str = "releases";
const SHARED_DIR: &str = "shared";
const CURRENT_LINK: &str = "current";

/// Paths of the release layout rooted at `project_path`
///
/// ```text
/// releases/<id>/
/// releases/<id>/<folder> -> ../../shared/<folder>
/// shared/<folder>/
/// current -> releases/<id>
/// ```
#[derive(Debug, Clone)]
pub struct ReleasePaths {
    root: PathBuf,
}

impl ReleasePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn releases_dir(&self) -> PathBuf {
        self.root.join(RELEASES_DIR)
    }

    pub fn release_dir(&self, id: &ReleaseId) -> PathBuf {
        self.releases_dir().join(id.as_str())
    }

    pub fn shared_dir(&self) -> PathBuf {
        self.root.join(SHARED_DIR)
    }

    pub fn shared_path(&self, folder: &LinkedFolder) -> PathBuf {
        self.shared_dir().join(&folder.path)
    }

    /// Where the folder's symlink lives inside a release
    pub fn folder_link(&self, id: &ReleaseId, folder: &LinkedFolder) -> PathBuf {
        self.release_dir(id).join(&folder.path)
    }

    /// Relative symlink target for a folder, valid from inside any release
    ///
    /// `uploads` gives `../../shared/uploads`, `storage/logs` gives
    /// `../../../shared/storage/logs`.
    pub fn folder_link_target(folder: &LinkedFolder) -> PathBuf {
        let mut target = PathBuf::new();
        for _ in 0..=folder.depth() {
            target.push("..");
        }
        target.push(SHARED_DIR);
        target.push(&folder.path);
        target
    }

    pub fn current_link(&self) -> PathBuf {
        self.root.join(CURRENT_LINK)
    }

    /// Relative target of `current` for a release
    pub fn current_target(id: &ReleaseId) -> PathBuf {
        Path::new(RELEASES_DIR).join(id.as_str())
    }

    /// Fresh temporary name next to `path`, used to stage a symlink before it
    /// is renamed over `path`
    pub fn staging_path(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(".{}.{}", name, Uuid::new_v4().simple()))
    }

    /// Release a `current` target points at, relative or absolute
    pub fn release_from_target(target: &Path) -> Option<ReleaseId> {
        match target.components().next_back()? {
            Component::Normal(name) => ReleaseId::parse(name.to_string_lossy()).ok(),
            _ => None,
        }
    }
}
