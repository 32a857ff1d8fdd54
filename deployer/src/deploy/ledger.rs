//! In-memory release history per project and server

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use chrono::Utc;

use crate::deploy::fsm::ReleaseEvent;
use crate::errors::DeployError;
use crate::models::project::ProjectId;
use crate::models::release::{Release, ReleaseId, ReleaseStatus};
use crate::models::server::ServerId;

/// Ledger key: one release history per project and server
pub type LedgerKey = (ProjectId, ServerId);

/// Release records, ordered by release ID
#[derive(Default)]
pub struct ReleaseLedger {
    entries: RwLock<HashMap<LedgerKey, Vec<Release>>>,
}

impl ReleaseLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// All releases for a key, oldest first
    pub fn releases(&self, key: &LedgerKey) -> Vec<Release> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned().unwrap_or_default()
    }

    pub fn get(&self, key: &LedgerKey, id: &ReleaseId) -> Option<Release> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key)?.iter().find(|r| &r.id == id).cloned()
    }

    pub fn active(&self, key: &LedgerKey) -> Option<Release> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)?
            .iter()
            .find(|r| r.status == ReleaseStatus::Active)
            .cloned()
    }

    pub fn latest_id(&self, key: &LedgerKey) -> Option<ReleaseId> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key)?.last().map(|r| r.id.clone())
    }

    /// Record a new pending release
    pub fn insert(&self, key: LedgerKey, release: Release) -> Result<(), DeployError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let releases = entries.entry(key).or_default();
        if releases.iter().any(|r| r.id == release.id) {
            return Err(DeployError::ValidationError(format!(
                "Release {} already exists",
                release.id
            )));
        }
        releases.push(release);
        releases.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(())
    }

    /// Apply an event to one release
    pub fn apply(
        &self,
        key: &LedgerKey,
        id: &ReleaseId,
        event: ReleaseEvent,
    ) -> Result<Release, DeployError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let release = entries
            .get_mut(key)
            .and_then(|releases| releases.iter_mut().find(|r| &r.id == id))
            .ok_or_else(|| DeployError::NotFound(format!("release {}", id)))?;

        release.process(event).map_err(DeployError::Internal)?;
        Ok(release.clone())
    }

    /// Make `id` the only active release, superseding the previous one
    ///
    /// Both updates happen under one lock, so readers never observe zero or
    /// two active releases.
    pub fn promote(
        &self,
        key: &LedgerKey,
        id: &ReleaseId,
        event: ReleaseEvent,
    ) -> Result<Release, DeployError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let releases = entries
            .get_mut(key)
            .ok_or_else(|| DeployError::NotFound(format!("release {}", id)))?;

        let index = releases
            .iter()
            .position(|r| &r.id == id)
            .ok_or_else(|| DeployError::NotFound(format!("release {}", id)))?;

        let mut promoted = releases[index].clone();
        promoted.process(event).map_err(DeployError::Internal)?;

        for release in releases.iter_mut() {
            if release.status == ReleaseStatus::Active && &release.id != id {
                release
                    .process(ReleaseEvent::Supersede)
                    .map_err(DeployError::Internal)?;
            }
        }
        releases[index] = promoted.clone();
        Ok(promoted)
    }

    /// Align the ledger with what is on the server
    ///
    /// Directories unknown to the ledger are recorded as inactive (or active
    /// when `current` points at them). Whatever `current` points at becomes
    /// active. Records whose directory vanished become purged. Pending and
    /// in-flight records are left alone.
    pub fn reconcile(
        &self,
        key: LedgerKey,
        on_disk: &[ReleaseId],
        current: Option<&ReleaseId>,
    ) -> Vec<Release> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let releases = entries.entry(key).or_default();
        let present: BTreeSet<&ReleaseId> = on_disk.iter().collect();

        for release in releases.iter_mut() {
            let settled = matches!(
                release.status,
                ReleaseStatus::Active | ReleaseStatus::Inactive | ReleaseStatus::Failed
            );
            if settled && !present.contains(&release.id) {
                release.status = ReleaseStatus::Purged;
            } else if release.status == ReleaseStatus::Active && current != Some(&release.id) {
                release.status = ReleaseStatus::Inactive;
            } else if matches!(release.status, ReleaseStatus::Inactive | ReleaseStatus::Failed)
                && current == Some(&release.id)
            {
                // A failed record can be live when its repoint landed late
                release.status = ReleaseStatus::Active;
                release.failed_in = None;
                release.error = None;
            }
        }

        for id in on_disk {
            if releases.iter().any(|r| &r.id == id) {
                continue;
            }
            let status = if current == Some(id) {
                ReleaseStatus::Active
            } else {
                ReleaseStatus::Inactive
            };
            releases.push(Release {
                id: id.clone(),
                status,
                created_at: Utc::now(),
                failed_in: None,
                error: None,
            });
        }

        releases.sort_by(|a, b| a.id.cmp(&b.id));
        releases.clone()
    }
}
