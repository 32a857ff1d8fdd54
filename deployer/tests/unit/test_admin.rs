//! Administrative service tests, run through a started runtime

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

use deployer::admin::authz::Actor;
use deployer::app::options::AppOptions;
use deployer::app::run::{start, Runtime};
use deployer::deploy::report::DeploymentStatus;
use deployer::deploy::{Cancellation, ReleaseRequest};
use deployer::errors::DeployError;
use deployer::folders::LinkedFolderRegistry;
use deployer::keys::PRIVATE_KEY_FILE;
use deployer::models::project::Project;
use deployer::models::release::ReleaseId;
use deployer::models::server::{Endpoint, NewServer, ServerUpdate};
use deployer::models::AccountId;
use deployer::storage::layout::StorageLayout;
use deployer::storage::records::MemoryServerRepository;
use deployer::storage::settings::{Settings, Transport};

use crate::common::{link_target, FakeKeygen, PUBLIC_KEY};

struct Fixture {
    tmp: TempDir,
    runtime: Runtime,
    records: Arc<MemoryServerRepository>,
    owner: Actor,
    project: Project,
}

impl Fixture {
    async fn start() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Settings {
            transport: Transport::Local,
            ..Default::default()
        };
        let options = AppOptions::from_settings(StorageLayout::new(tmp.path()), &settings);

        let records = Arc::new(MemoryServerRepository::new());
        let runtime = start(
            options,
            records.clone(),
            Arc::new(LinkedFolderRegistry::new()),
            Arc::new(FakeKeygen::default()),
        )
        .await
        .unwrap();

        let owner = Actor::new(AccountId::new());
        let project = Project::new(owner.account_id, "shop");
        Self {
            tmp,
            runtime,
            records,
            owner,
            project,
        }
    }

    fn new_server(&self, name: &str) -> NewServer {
        NewServer {
            name: name.to_string(),
            endpoint: Endpoint {
                address: "127.0.0.1".to_string(),
                port: 22,
                connect_as: "deploy".to_string(),
            },
            project_path: self.root(name).display().to_string(),
        }
    }

    fn root(&self, name: &str) -> PathBuf {
        self.tmp.path().join("servers").join(name)
    }

    fn key_dir(&self, name: &str) -> PathBuf {
        let server = self
            .records
            .all()
            .into_iter()
            .find(|s| s.name == name)
            .unwrap();
        self.tmp.path().join("keys").join(server.id.to_string())
    }
}

#[tokio::test]
async fn test_create_provisions_key_for_owner_only() {
    let fx = Fixture::start().await;
    let services = &fx.runtime.state.server_service;

    let stranger = Actor::new(AccountId::new());
    let err = assert_err!(
        services
            .create(&stranger, &fx.project, fx.new_server("web-1"))
            .await
    );
    assert!(matches!(err, DeployError::Unauthorized(_)));
    assert!(fx.records.all().is_empty());

    let server = assert_ok!(
        services
            .create(&fx.owner, &fx.project, fx.new_server("web-1"))
            .await
    );
    assert_eq!(server.project_id, fx.project.id);
    assert!(server.public_key.as_deref().unwrap().starts_with(PUBLIC_KEY));
    assert!(fx.key_dir("web-1").join(PRIVATE_KEY_FILE).exists());

    let listed = assert_ok!(services.list(&fx.owner, &fx.project).await);
    assert_eq!(listed, vec![server]);

    assert_ok!(fx.runtime.shutdown().await);
}

#[tokio::test]
async fn test_create_rejects_relative_project_path() {
    let fx = Fixture::start().await;
    let mut new = fx.new_server("web-1");
    new.project_path = "srv/shop".to_string();

    let err = assert_err!(
        fx.runtime
            .state
            .server_service
            .create(&fx.owner, &fx.project, new)
            .await
    );
    assert!(matches!(err, DeployError::ValidationError(_)));
    assert!(fx.records.all().is_empty());
}

#[tokio::test]
async fn test_show_and_update_through_owning_project() {
    let fx = Fixture::start().await;
    let services = &fx.runtime.state.server_service;
    let server = services
        .create(&fx.owner, &fx.project, fx.new_server("web-1"))
        .await
        .unwrap();

    let shown = assert_ok!(services.show(&fx.owner, &fx.project, server.id).await);
    assert_eq!(shown.id, server.id);

    let other = Project::new(fx.owner.account_id, "blog");
    let err = assert_err!(services.show(&fx.owner, &other, server.id).await);
    assert!(matches!(err, DeployError::AssociationMismatchError { .. }));

    let stranger = Actor::new(AccountId::new());
    let err = assert_err!(services.show(&stranger, &fx.project, server.id).await);
    assert!(matches!(err, DeployError::Unauthorized(_)));

    let updated = assert_ok!(
        services
            .update(
                &fx.owner,
                &fx.project,
                server.id,
                ServerUpdate {
                    port: Some(2222),
                    ..Default::default()
                },
            )
            .await
    );
    assert_eq!(updated.id, server.id);
    assert_eq!(updated.endpoint.port, 2222);
    assert_eq!(updated.public_key, server.public_key);
}

#[tokio::test]
async fn test_destroy_retires_keys_in_background() {
    let fx = Fixture::start().await;
    let services = &fx.runtime.state.server_service;
    let kept = services
        .create(&fx.owner, &fx.project, fx.new_server("web-1"))
        .await
        .unwrap();
    let gone = services
        .create(&fx.owner, &fx.project, fx.new_server("web-2"))
        .await
        .unwrap();
    let kept_dir = fx.key_dir("web-1");
    let gone_dir = fx.key_dir("web-2");

    assert_ok!(services.destroy(&fx.owner, &fx.project, kept.id).await);

    // A key directory that already vanished does not fail the request
    std::fs::remove_dir_all(&gone_dir).unwrap();
    assert_ok!(services.destroy(&fx.owner, &fx.project, gone.id).await);

    let records = fx.records.clone();
    assert_ok!(fx.runtime.shutdown().await);

    assert!(!kept_dir.exists());
    assert!(records.all().is_empty());
}

#[tokio::test]
async fn test_folder_service() {
    let fx = Fixture::start().await;
    let folders = &fx.runtime.state.folder_service;

    let folder = assert_ok!(folders.add(&fx.owner, &fx.project, "uploads"));
    let err = assert_err!(folders.add(&fx.owner, &fx.project, "uploads/"));
    assert!(matches!(err, DeployError::DuplicateFolderError { .. }));

    let stranger = Actor::new(AccountId::new());
    let err = assert_err!(folders.add(&stranger, &fx.project, "cache"));
    assert!(matches!(err, DeployError::Unauthorized(_)));
    let err = assert_err!(folders.remove(&stranger, &fx.project, folder.id));
    assert!(matches!(err, DeployError::Unauthorized(_)));

    assert_ok!(folders.remove(&fx.owner, &fx.project, folder.id));
    assert!(assert_ok!(folders.list(&fx.owner, &fx.project)).is_empty());
}

#[tokio::test]
async fn test_deployment_service_end_to_end() {
    let fx = Fixture::start().await;
    let state = &fx.runtime.state;
    state
        .server_service
        .create(&fx.owner, &fx.project, fx.new_server("web-1"))
        .await
        .unwrap();
    state
        .folder_service
        .add(&fx.owner, &fx.project, "uploads")
        .unwrap();

    let stranger = Actor::new(AccountId::new());
    let err = assert_err!(
        state
            .deployment_service
            .deploy(
                &stranger,
                &fx.project,
                ReleaseRequest::default(),
                Cancellation::never()
            )
            .await
    );
    assert!(matches!(err, DeployError::Unauthorized(_)));

    for raw in ["r1", "r2"] {
        let report = assert_ok!(
            state
                .deployment_service
                .deploy(
                    &fx.owner,
                    &fx.project,
                    ReleaseRequest {
                        release_id: Some(ReleaseId::parse(raw).unwrap()),
                        source: None,
                    },
                    Cancellation::never(),
                )
                .await
        );
        assert_eq!(report.status, DeploymentStatus::Success);
    }

    let root = fx.root("web-1");
    assert_eq!(link_target(&root.join("current")), PathBuf::from("releases/r2"));
    assert_eq!(
        link_target(&root.join("releases/r2/uploads")),
        PathBuf::from("../../shared/uploads")
    );

    let report = assert_ok!(
        state
            .deployment_service
            .rollback(&fx.owner, &fx.project, None)
            .await
    );
    assert_eq!(report.status, DeploymentStatus::Success);
    assert_eq!(link_target(&root.join("current")), PathBuf::from("releases/r1"));

    let reports = assert_ok!(state.deployment_service.prune(&fx.owner, &fx.project).await);
    assert_eq!(reports.len(), 1);
    assert!(reports[0].error.is_none());

    assert_ok!(fx.runtime.shutdown().await);
    assert!(root.join("releases/r1").is_dir());
    assert!(root.join("releases/r2").is_dir());
}
