//! Release pipeline for one project on one server

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::deploy::fsm::ReleaseEvent;
use crate::deploy::ledger::{LedgerKey, ReleaseLedger};
use crate::deploy::paths::ReleasePaths;
use crate::deploy::{Cancellation, ReleaseRequest, SourceSpec};
use crate::errors::DeployError;
use crate::models::folder::LinkedFolder;
use crate::models::release::{Release, ReleaseId, ReleaseStatus};
use crate::models::server::{Server, ServerId};
use crate::remote::RemoteShell;
use crate::storage::settings::ReleaseSettings;
use crate::utils::with_timeout;

/// Drives releases of one project on one server through their lifecycle
///
/// Every remote call is bounded by the operation timeout. Callers are
/// expected to hold the server's single-flight lock.
pub struct ReleaseManager {
    key: LedgerKey,
    shell: Arc<dyn RemoteShell>,
    paths: ReleasePaths,
    ledger: Arc<ReleaseLedger>,
    settings: ReleaseSettings,
}

impl ReleaseManager {
    pub fn new(
        server: &Server,
        shell: Arc<dyn RemoteShell>,
        ledger: Arc<ReleaseLedger>,
        settings: ReleaseSettings,
    ) -> Self {
        Self {
            key: (server.project_id, server.id),
            shell,
            paths: ReleasePaths::new(&server.project_path),
            ledger,
            settings,
        }
    }

    pub fn server_id(&self) -> ServerId {
        self.key.1
    }

    /// Known releases, oldest first
    pub fn releases(&self) -> Vec<Release> {
        self.ledger.releases(&self.key)
    }

    /// The active release, if any
    pub fn current(&self) -> Option<Release> {
        self.ledger.active(&self.key)
    }

    /// Newest inactive release older than the active one
    pub fn rollback_target(&self) -> Option<Release> {
        let releases = self.releases();
        let active = releases
            .iter()
            .find(|r| r.status == ReleaseStatus::Active)
            .map(|r| r.id.clone());

        releases
            .into_iter()
            .rev()
            .filter(|r| r.status == ReleaseStatus::Inactive)
            .find(|r| active.as_ref().map_or(true, |a| r.id < *a))
    }

    async fn remote<T, F>(&self, operation: &str, fut: F) -> Result<T, DeployError>
    where
        F: std::future::Future<Output = Result<T, DeployError>>,
    {
        with_timeout(operation, self.settings.operation_timeout(), fut).await
    }

    /// Reconcile the ledger with the release directories and `current`
    pub async fn discover(&self) -> Result<Vec<Release>, DeployError> {
        let names = self
            .remote("list releases", self.shell.list_dirs(&self.paths.releases_dir()))
            .await?;
        let on_disk: Vec<ReleaseId> = names
            .into_iter()
            .filter_map(|name| ReleaseId::parse(name).ok())
            .collect();

        let current = self
            .remote("read current", self.shell.read_link(&self.paths.current_link()))
            .await?
            .and_then(|target| ReleasePaths::release_from_target(&target));

        Ok(self.ledger.reconcile(self.key, &on_disk, current.as_ref()))
    }

    /// Record a fresh pending release
    ///
    /// An explicit ID must sort after every release already known for this
    /// server; otherwise one is generated from the clock.
    pub fn begin(&self, requested: Option<ReleaseId>) -> Result<Release, DeployError> {
        let latest = self.ledger.latest_id(&self.key);
        let id = match requested {
            Some(id) => {
                if let Some(latest) = latest.as_ref().filter(|latest| id <= **latest) {
                    return Err(DeployError::ValidationError(format!(
                        "Release {} does not sort after existing release {}",
                        id, latest
                    )));
                }
                id
            }
            None => ReleaseId::generate(Utc::now(), latest.as_ref()),
        };

        let release = Release::pending(id);
        self.ledger.insert(self.key, release.clone())?;
        info!("Release {} pending on server {}", release.id, self.server_id());
        Ok(release)
    }

    /// pending -> building: create and populate the release directory
    pub async fn build(&self, id: &ReleaseId, source: Option<&SourceSpec>) -> Result<(), DeployError> {
        self.check(id, &ReleaseEvent::Build)?;
        let result = self.populate(id, source).await;
        self.settle(id, ReleaseEvent::Build, result)
    }

    /// building -> folders_linked: point every linked folder at `shared/`
    ///
    /// Safe to repeat: links already pointing at the right place are left
    /// alone, stale ones are replaced.
    pub async fn link_folders(&self, id: &ReleaseId, folders: &[LinkedFolder]) -> Result<(), DeployError> {
        self.check(id, &ReleaseEvent::LinkFolders)?;
        let result = self.link_all(id, folders).await;
        self.settle(id, ReleaseEvent::LinkFolders, result)
    }

    /// folders_linked -> active: repoint `current`
    pub async fn activate(&self, id: &ReleaseId) -> Result<Release, DeployError> {
        self.check(id, &ReleaseEvent::Activate)?;
        if let Err(e) = self.repoint(id).await {
            if !self.current_is(id).await {
                return Err(self.fail(id, e));
            }
            warn!(
                "Repoint to release {} on server {} reported '{}' but took effect",
                id,
                self.server_id(),
                e
            );
        }

        let release = self.ledger.promote(&self.key, id, ReleaseEvent::Activate)?;
        info!("Release {} active on server {}", id, self.server_id());
        Ok(release)
    }

    /// Run the whole pipeline for a new release
    ///
    /// Cancellation is honoured before each step; once the repoint has
    /// started it runs to completion.
    pub async fn deploy(
        &self,
        request: &ReleaseRequest,
        folders: &[LinkedFolder],
        cancel: &Cancellation,
    ) -> Result<Release, DeployError> {
        self.discover().await?;
        let id = self.begin(request.release_id.clone())?.id;

        self.proceed(&id, cancel)?;
        self.build(&id, request.source.as_ref()).await?;

        self.proceed(&id, cancel)?;
        self.link_folders(&id, folders).await?;

        self.proceed(&id, cancel)?;
        self.activate(&id).await
    }

    /// Point `current` back at an earlier release, without rebuilding it
    pub async fn rollback(&self, target: Option<ReleaseId>) -> Result<Release, DeployError> {
        self.discover().await?;

        let target = match target {
            Some(id) => self
                .ledger
                .get(&self.key, &id)
                .ok_or_else(|| DeployError::NotFound(format!("release {}", id)))?,
            None => self.rollback_target().ok_or_else(|| {
                DeployError::NotFound("no earlier release to roll back to".to_string())
            })?,
        };

        if target.status != ReleaseStatus::Inactive {
            return Err(DeployError::ValidationError(format!(
                "Release {} is {}; only inactive releases can be rolled back to",
                target.id, target.status
            )));
        }

        if let Err(e) = self.repoint(&target.id).await {
            if self.current_is(&target.id).await {
                warn!(
                    "Rollback to release {} on server {} reported '{}' but took effect",
                    target.id,
                    self.server_id(),
                    e
                );
                return self
                    .ledger
                    .promote(&self.key, &target.id, ReleaseEvent::Reinstate);
            }
            error!(
                "Rollback to release {} failed on server {}: {}",
                target.id,
                self.server_id(),
                e
            );
            return Err(DeployError::TransitionError {
                server_id: self.server_id(),
                release_id: target.id,
                state: ReleaseStatus::Active,
                source: Box::new(e),
            });
        }

        let release = self
            .ledger
            .promote(&self.key, &target.id, ReleaseEvent::Reinstate)?;
        info!("Server {} rolled back to release {}", self.server_id(), release.id);
        Ok(release)
    }

    /// Delete old release directories, keeping the newest `keep`
    ///
    /// The active release and the immediate rollback target survive even
    /// when they fall outside the retention window.
    pub async fn prune(&self, keep: usize) -> Result<Vec<ReleaseId>, DeployError> {
        let releases = self.discover().await?;
        let on_disk: Vec<&Release> = releases
            .iter()
            .filter(|r| {
                matches!(
                    r.status,
                    ReleaseStatus::Active | ReleaseStatus::Inactive | ReleaseStatus::Failed
                )
            })
            .collect();

        if on_disk.len() <= keep {
            return Ok(Vec::new());
        }

        let protected: Vec<ReleaseId> = [self.current(), self.rollback_target()]
            .into_iter()
            .flatten()
            .map(|r| r.id)
            .collect();

        let mut purged = Vec::new();
        for release in &on_disk[..on_disk.len() - keep] {
            if protected.contains(&release.id) {
                continue;
            }

            self.remote(
                "remove release",
                self.shell.remove_dir_all(&self.paths.release_dir(&release.id)),
            )
            .await?;
            self.ledger
                .apply(&self.key, &release.id, ReleaseEvent::Purge)?;
            info!("Purged release {} from server {}", release.id, self.server_id());
            purged.push(release.id.clone());
        }

        Ok(purged)
    }

    /// Reject an event the release cannot take, before touching the server
    fn check(&self, id: &ReleaseId, event: &ReleaseEvent) -> Result<(), DeployError> {
        let mut release = self
            .ledger
            .get(&self.key, id)
            .ok_or_else(|| DeployError::NotFound(format!("release {}", id)))?;
        release
            .process(event.clone())
            .map_err(DeployError::ValidationError)
    }

    fn proceed(&self, id: &ReleaseId, cancel: &Cancellation) -> Result<(), DeployError> {
        if cancel.is_cancelled() {
            return Err(self.fail(id, DeployError::Cancelled));
        }
        Ok(())
    }

    fn settle(
        &self,
        id: &ReleaseId,
        event: ReleaseEvent,
        result: Result<(), DeployError>,
    ) -> Result<(), DeployError> {
        match result {
            Ok(()) => {
                let release = self.ledger.apply(&self.key, id, event)?;
                info!("Release {} {} on server {}", id, release.status, self.server_id());
                Ok(())
            }
            Err(e) => Err(self.fail(id, e)),
        }
    }

    /// Mark the release failed and wrap the cause with the state it failed in
    fn fail(&self, id: &ReleaseId, cause: DeployError) -> DeployError {
        let state = match self
            .ledger
            .apply(&self.key, id, ReleaseEvent::Fail(cause.to_string()))
        {
            Ok(release) => release.failed_in.unwrap_or(ReleaseStatus::Failed),
            Err(e) => return e,
        };

        error!(
            "Release {} failed while {} on server {}: {}",
            id,
            state,
            self.server_id(),
            cause
        );
        DeployError::TransitionError {
            server_id: self.server_id(),
            release_id: id.clone(),
            state,
            source: Box::new(cause),
        }
    }

    async fn populate(&self, id: &ReleaseId, source: Option<&SourceSpec>) -> Result<(), DeployError> {
        let dir = self.paths.release_dir(id);
        self.remote("create release directory", self.shell.create_dir_all(&dir))
            .await?;

        if let Some(source) = source {
            info!(
                "Cloning {} ({}) into release {}",
                source.repository, source.branch, id
            );
            with_timeout(
                "clone source",
                self.settings.build_timeout(),
                self.shell.exec("git", &source.clone_args(&dir)),
            )
            .await?;
        }
        Ok(())
    }

    async fn link_all(&self, id: &ReleaseId, folders: &[LinkedFolder]) -> Result<(), DeployError> {
        for folder in folders {
            self.link_folder(id, folder).await?;
        }
        Ok(())
    }

    async fn link_folder(&self, id: &ReleaseId, folder: &LinkedFolder) -> Result<(), DeployError> {
        let shared = self.paths.shared_path(folder);
        self.remote("create shared folder", self.shell.create_dir_all(&shared))
            .await?;

        let link = self.paths.folder_link(id, folder);
        if let Some(parent) = link.parent() {
            self.remote("create link parent", self.shell.create_dir_all(parent))
                .await?;
        }

        let target = ReleasePaths::folder_link_target(folder);
        match self
            .remote("read folder link", self.shell.read_link(&link))
            .await?
        {
            Some(existing) if existing == target => {
                debug!("Folder '{}' already linked in release {}", folder.path, id);
                return Ok(());
            }
            Some(existing) => {
                warn!(
                    "Replacing link '{}' -> {} in release {}",
                    folder.path,
                    existing.display(),
                    id
                );
            }
            None => {
                // A copy shipped with the release yields to the shared folder
                if self.remote("inspect folder", self.shell.is_dir(&link)).await? {
                    self.remote("remove folder", self.shell.remove_dir_all(&link))
                        .await?;
                }
            }
        }

        self.replace_link(&target, &link).await?;
        debug!(
            "Linked '{}' -> {} in release {}",
            folder.path,
            target.display(),
            id
        );
        Ok(())
    }

    /// Whether `current` on the server points at `id`
    ///
    /// Used after a failed repoint: a rename can land even when its
    /// acknowledgement times out.
    async fn current_is(&self, id: &ReleaseId) -> bool {
        match self
            .remote("read current", self.shell.read_link(&self.paths.current_link()))
            .await
        {
            Ok(Some(target)) => ReleasePaths::release_from_target(&target).as_ref() == Some(id),
            Ok(None) => false,
            Err(e) => {
                warn!("Unable to confirm current on server {}: {}", self.server_id(), e);
                false
            }
        }
    }

    async fn repoint(&self, id: &ReleaseId) -> Result<(), DeployError> {
        let dir = self.paths.release_dir(id);
        if !self.remote("inspect release", self.shell.is_dir(&dir)).await? {
            return Err(DeployError::NotFound(format!("release directory for {}", id)));
        }

        self.replace_link(&ReleasePaths::current_target(id), &self.paths.current_link())
            .await
    }

    /// Create the symlink beside `link`, then rename it into place
    async fn replace_link(&self, target: &Path, link: &Path) -> Result<(), DeployError> {
        let staged = ReleasePaths::staging_path(link);
        self.remote("stage symlink", self.shell.symlink(target, &staged))
            .await?;

        if let Err(e) = self.remote("swap symlink", self.shell.rename(&staged, link)).await {
            if let Err(cleanup) = self.shell.remove_file(&staged).await {
                warn!("Failed to remove staged link {}: {}", staged.display(), cleanup);
            }
            return Err(e);
        }
        Ok(())
    }
}
