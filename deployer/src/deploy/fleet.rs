//! Concurrent execution across a project's servers

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::{join_all, BoxFuture};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::deploy::ledger::ReleaseLedger;
use crate::deploy::release::ReleaseManager;
use crate::deploy::report::ServerOutcome;
use crate::deploy::{Cancellation, ReleaseRequest};
use crate::errors::DeployError;
use crate::keys::store::KeyStore;
use crate::keys::PublicKey;
use crate::models::folder::LinkedFolder;
use crate::models::release::{Release, ReleaseId};
use crate::models::server::{Server, ServerId};
use crate::remote::ShellConnector;
use crate::storage::settings::ReleaseSettings;

type Job<T> = BoxFuture<'static, Result<T, DeployError>>;

/// Runs one operation per server concurrently and collects every outcome
///
/// Each server runs on its own spawned task, so dropping the caller never
/// interrupts a server halfway through repointing `current`. At most one
/// release pipeline runs per server at a time.
pub struct ServerFleet {
    connector: Arc<dyn ShellConnector>,
    ledger: Arc<ReleaseLedger>,
    locks: Mutex<HashMap<ServerId, Arc<AsyncMutex<()>>>>,
    settings: ReleaseSettings,
}

impl ServerFleet {
    pub fn new(
        connector: Arc<dyn ShellConnector>,
        ledger: Arc<ReleaseLedger>,
        settings: ReleaseSettings,
    ) -> Self {
        Self {
            connector,
            ledger,
            locks: Mutex::new(HashMap::new()),
            settings,
        }
    }

    pub fn settings(&self) -> &ReleaseSettings {
        &self.settings
    }

    /// Release manager for one server
    pub fn manager(&self, server: &Server) -> Result<ReleaseManager, DeployError> {
        let shell = self.connector.connect(server)?;
        Ok(ReleaseManager::new(
            server,
            shell,
            self.ledger.clone(),
            self.settings.clone(),
        ))
    }

    fn lock_for(&self, server_id: ServerId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(server_id).or_default().clone()
    }

    /// Drop the single-flight lock of a deleted server
    ///
    /// A pipeline still holding the lock keeps its own handle.
    pub fn forget(&self, server_id: ServerId) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks.remove(&server_id).is_some() {
            debug!("Released lock entry for server {}", server_id);
        }
    }

    /// Claim a server for a pipeline, refusing if one is already running
    fn claim(&self, server_id: ServerId) -> Result<OwnedMutexGuard<()>, DeployError> {
        self.lock_for(server_id)
            .try_lock_owned()
            .map_err(|_| DeployError::ServerBusyError(server_id))
    }

    /// Spawn every job, then wait for all of them
    async fn fan_out<T: Send + 'static>(
        jobs: Vec<(ServerId, Result<Job<T>, DeployError>)>,
    ) -> Vec<ServerOutcome<T>> {
        let handles: Vec<(ServerId, Result<JoinHandle<Result<T, DeployError>>, DeployError>)> =
            jobs.into_iter()
                .map(|(server_id, job)| (server_id, job.map(tokio::spawn)))
                .collect();

        join_all(handles.into_iter().map(|(server_id, handle)| async move {
            let result = match handle {
                Ok(handle) => match handle.await {
                    Ok(result) => result,
                    Err(e) => Err(DeployError::Internal(format!(
                        "Task for server {} did not complete: {}",
                        server_id, e
                    ))),
                },
                Err(e) => Err(e),
            };

            if let Err(e) = &result {
                warn!("Server {}: {}", server_id, e);
            }
            ServerOutcome { server_id, result }
        }))
        .await
    }

    /// Generate key pairs for servers that lack one, or for all with `rekey`
    ///
    /// Re-keying replaces private keys already authorized on the servers.
    pub async fn provision_keys(
        &self,
        servers: &[Server],
        keys: &Arc<KeyStore>,
        rekey: bool,
    ) -> Vec<ServerOutcome<PublicKey>> {
        let jobs = servers
            .iter()
            .map(|server| {
                let server_id = server.id;
                let keys = keys.clone();
                let mut server = server.clone();
                let job: Job<PublicKey> = Box::pin(async move {
                    if rekey {
                        keys.provision(&mut server).await
                    } else {
                        keys.ensure(&mut server).await
                    }
                });
                (server_id, Ok(job))
            })
            .collect();
        Self::fan_out(jobs).await
    }

    /// Deploy a new release to every server
    pub async fn deploy(
        &self,
        servers: &[Server],
        folders: &[LinkedFolder],
        request: &ReleaseRequest,
        cancel: &Cancellation,
    ) -> Vec<ServerOutcome<Release>> {
        let jobs = servers
            .iter()
            .map(|server| {
                let job = self.claim(server.id).and_then(|guard| {
                    let manager = self.manager(server)?;
                    let folders = folders.to_vec();
                    let request = request.clone();
                    let cancel = cancel.clone();
                    let job: Job<Release> = Box::pin(async move {
                        let _guard = guard;
                        manager.deploy(&request, &folders, &cancel).await
                    });
                    Ok(job)
                });
                (server.id, job)
            })
            .collect();

        debug!("Deploying to {} server(s)", servers.len());
        Self::fan_out(jobs).await
    }

    /// Roll every server back to `target`, or to its previous release
    pub async fn rollback(
        &self,
        servers: &[Server],
        target: Option<&ReleaseId>,
    ) -> Vec<ServerOutcome<Release>> {
        let jobs = servers
            .iter()
            .map(|server| {
                let job = self.claim(server.id).and_then(|guard| {
                    let manager = self.manager(server)?;
                    let target = target.cloned();
                    let job: Job<Release> = Box::pin(async move {
                        let _guard = guard;
                        manager.rollback(target).await
                    });
                    Ok(job)
                });
                (server.id, job)
            })
            .collect();

        Self::fan_out(jobs).await
    }

    /// Prune old releases on every server, waiting for running pipelines
    pub async fn prune(&self, servers: &[Server], keep: usize) -> Vec<ServerOutcome<Vec<ReleaseId>>> {
        let jobs = servers
            .iter()
            .map(|server| {
                let lock = self.lock_for(server.id);
                let job = self.manager(server).map(|manager| {
                    let job: Job<Vec<ReleaseId>> = Box::pin(async move {
                        let _guard = lock.lock_owned().await;
                        manager.prune(keep).await
                    });
                    job
                });
                (server.id, job)
            })
            .collect();

        Self::fan_out(jobs).await
    }

    /// Reconciled release history of every server
    pub async fn releases(&self, servers: &[Server]) -> Vec<ServerOutcome<Vec<Release>>> {
        let jobs = servers
            .iter()
            .map(|server| {
                let lock = self.lock_for(server.id);
                let job = self.manager(server).map(|manager| {
                    let job: Job<Vec<Release>> = Box::pin(async move {
                        let _guard = lock.lock_owned().await;
                        manager.discover().await
                    });
                    job
                });
                (server.id, job)
            })
            .collect();

        Self::fan_out(jobs).await
    }
}
