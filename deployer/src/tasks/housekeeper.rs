//! Executes deferred key retirement and release pruning

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::deploy::fleet::ServerFleet;
use crate::keys::store::KeyStore;
use crate::models::project::ProjectId;
use crate::models::server::ServerId;
use crate::storage::records::ServerRepository;
use crate::tasks::worker::TaskHandler;
use crate::tasks::Task;

pub struct Housekeeper {
    keys: Arc<KeyStore>,
    records: Arc<dyn ServerRepository>,
    fleet: Arc<ServerFleet>,
}

impl Housekeeper {
    pub fn new(
        keys: Arc<KeyStore>,
        records: Arc<dyn ServerRepository>,
        fleet: Arc<ServerFleet>,
    ) -> Self {
        Self {
            keys,
            records,
            fleet,
        }
    }

    async fn prune(&self, project_id: ProjectId, server_id: ServerId) {
        let server = match self.records.get(server_id).await {
            Ok(Some(server)) if server.project_id == project_id => server,
            Ok(_) => {
                debug!("Server {} is gone, nothing to prune", server_id);
                return;
            }
            Err(e) => {
                warn!("Failed to load server {} for pruning: {}", server_id, e);
                return;
            }
        };

        let keep = self.fleet.settings().keep;
        for outcome in self.fleet.prune(std::slice::from_ref(&server), keep).await {
            match outcome.result {
                Ok(purged) if purged.is_empty() => {}
                Ok(purged) => info!(
                    "Pruned {} release(s) from server {}",
                    purged.len(),
                    outcome.server_id
                ),
                Err(e) => warn!("Pruning server {} failed: {}", outcome.server_id, e),
            }
        }
    }
}

#[async_trait]
impl TaskHandler for Housekeeper {
    async fn handle(&self, task: Task) {
        match task {
            Task::RetireKeys { server_id } => {
                self.keys.purge(server_id).await;
                self.fleet.forget(server_id);
            }
            Task::PruneReleases {
                project_id,
                server_id,
            } => self.prune(project_id, server_id).await,
        }
    }
}
