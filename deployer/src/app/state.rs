//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::admin::authz::{AuthorizationCheck, OwnerPolicy};
use crate::admin::deployments::DeploymentService;
use crate::admin::folders::FolderService;
use crate::admin::servers::ServerService;
use crate::app::options::AppOptions;
use crate::deploy::coordinator::DeploymentCoordinator;
use crate::deploy::fleet::ServerFleet;
use crate::deploy::ledger::ReleaseLedger;
use crate::filesys::dir::Dir;
use crate::folders::LinkedFolderRegistry;
use crate::keys::generator::KeyGenerator;
use crate::keys::store::KeyStore;
use crate::remote::TransportConnector;
use crate::storage::records::ServerRepository;
use crate::tasks::TaskQueue;

/// Every long-lived component, wired together
pub struct AppState {
    pub records: Arc<dyn ServerRepository>,
    pub keys: Arc<KeyStore>,
    pub folders: Arc<LinkedFolderRegistry>,
    pub fleet: Arc<ServerFleet>,
    pub coordinator: Arc<DeploymentCoordinator>,

    /// Administrative services
    pub server_service: ServerService,
    pub folder_service: FolderService,
    pub deployment_service: DeploymentService,
}

impl AppState {
    /// Initialize application state
    pub fn init(
        options: &AppOptions,
        records: Arc<dyn ServerRepository>,
        folders: Arc<LinkedFolderRegistry>,
        generator: Arc<dyn KeyGenerator>,
        tasks: Arc<dyn TaskQueue>,
    ) -> Self {
        info!("Initializing application state...");

        let keys = Arc::new(KeyStore::new(
            Dir::new(&options.key_root),
            generator,
            options.keys.comment.clone(),
            records.clone(),
            tasks.clone(),
        ));

        let connector = Arc::new(TransportConnector::new(
            options.transport,
            options.ssh.clone(),
            keys.clone(),
        ));
        let fleet = Arc::new(ServerFleet::new(
            connector,
            Arc::new(ReleaseLedger::new()),
            options.releases.clone(),
        ));

        let coordinator = Arc::new(DeploymentCoordinator::new(
            keys.clone(),
            folders.clone(),
            fleet.clone(),
            tasks,
        ));

        let authz: Arc<dyn AuthorizationCheck> = Arc::new(OwnerPolicy);

        Self {
            server_service: ServerService::new(records.clone(), keys.clone(), authz.clone()),
            folder_service: FolderService::new(folders.clone(), authz.clone()),
            deployment_service: DeploymentService::new(
                records.clone(),
                coordinator.clone(),
                authz,
            ),
            records,
            keys,
            folders,
            fleet,
            coordinator,
        }
    }
}
