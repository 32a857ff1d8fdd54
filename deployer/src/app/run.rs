//! Application runtime: state plus the background task worker

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::folders::LinkedFolderRegistry;
use crate::keys::generator::KeyGenerator;
use crate::storage::records::ServerRepository;
use crate::tasks::housekeeper::Housekeeper;
use crate::tasks::{worker, ChannelQueue};

/// A started deployer: components plus the running task worker
pub struct Runtime {
    pub state: Arc<AppState>,
    shutdown_manager: ShutdownManager,
}

impl Runtime {
    /// Drain queued tasks and stop the worker
    pub async fn shutdown(mut self) -> Result<(), DeployError> {
        self.shutdown_manager.shutdown().await
    }
}

/// Build the application state and start the task worker
pub async fn start(
    options: AppOptions,
    records: Arc<dyn ServerRepository>,
    folders: Arc<LinkedFolderRegistry>,
    generator: Arc<dyn KeyGenerator>,
) -> Result<Runtime, DeployError> {
    info!("Initializing deployer...");

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    let key_root = Dir::new(&options.key_root);
    key_root.create().await?;
    key_root.set_permissions_700().await?;

    let (queue, receiver) = ChannelQueue::new();
    let state = Arc::new(AppState::init(
        &options,
        records,
        folders,
        generator,
        Arc::new(queue),
    ));

    info!("Initializing task worker...");
    let housekeeper = Housekeeper::new(
        state.keys.clone(),
        state.records.clone(),
        state.fleet.clone(),
    );
    let mut shutdown_rx = shutdown_tx.subscribe();
    let worker_handle = tokio::spawn(async move {
        worker::run(
            &housekeeper,
            receiver,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });
    shutdown_manager.with_task_worker_handle(worker_handle)?;

    Ok(Runtime {
        state,
        shutdown_manager,
    })
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    task_worker_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            task_worker_handle: None,
        }
    }

    fn with_task_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), DeployError> {
        if self.task_worker_handle.is_some() {
            return Err(DeployError::Internal(
                "task_worker_handle already set".to_string(),
            ));
        }
        self.task_worker_handle = Some(handle);
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), DeployError> {
        let _ = self.shutdown_tx.send(());

        let Some(mut handle) = self.task_worker_handle.take() else {
            return Ok(());
        };

        match tokio::time::timeout(self.lifecycle_options.max_shutdown_delay, &mut handle).await {
            Ok(result) => {
                result.map_err(|e| DeployError::Internal(e.to_string()))?;
                info!("Shutdown complete");
                Ok(())
            }
            Err(_) => {
                error!(
                    "Task worker did not drain within {:?}, aborting...",
                    self.lifecycle_options.max_shutdown_delay
                );
                handle.abort();
                Err(DeployError::TimeoutError("task worker shutdown".to_string()))
            }
        }
    }
}
