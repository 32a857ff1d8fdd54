//! Multi-server deployment tests

use std::path::PathBuf;

use tokio_test::{assert_err, assert_ok};

use deployer::deploy::report::DeploymentStatus;
use deployer::deploy::{Cancellation, ReleaseRequest};
use deployer::errors::DeployError;
use deployer::models::project::Project;
use deployer::models::release::{ReleaseId, ReleaseStatus};
use deployer::storage::records::ServerRepository;
use deployer::tasks::Task;

use crate::common::{link_target, server_for, Harness};

fn request(raw: &str) -> ReleaseRequest {
    ReleaseRequest {
        release_id: Some(ReleaseId::parse(raw).unwrap()),
        source: None,
    }
}

#[tokio::test]
async fn test_missing_credentials_fail_before_any_server_is_touched() {
    let harness = Harness::new();
    let ready = harness.add_provisioned_server("web-1").await;
    let bare = harness.add_server("web-2").await;

    let err = assert_err!(
        harness
            .coordinator
            .deploy(
                &harness.project,
                &[ready, bare.clone()],
                request("r1"),
                Cancellation::never(),
            )
            .await
    );
    assert!(matches!(err, DeployError::MissingCredentialsError(id) if id == bare.id));

    assert!(!harness.server_root("web-1").exists());
    assert!(!harness.server_root("web-2").exists());
    assert!(harness.queue.tasks().is_empty());
}

#[tokio::test]
async fn test_foreign_server_is_rejected() {
    let harness = Harness::new();
    let ours = harness.add_provisioned_server("web-1").await;

    let other = Project::new(harness.owner, "blog");
    let mut theirs = server_for(&other, "blog-1", &harness.server_root("blog-1"));
    theirs = harness.records.insert(theirs).await.unwrap();
    harness.keys.provision(&mut theirs).await.unwrap();

    let err = assert_err!(
        harness
            .coordinator
            .deploy(
                &harness.project,
                &[ours, theirs],
                request("r1"),
                Cancellation::never(),
            )
            .await
    );
    assert!(matches!(err, DeployError::AssociationMismatchError { .. }));
    assert!(!harness.server_root("web-1").exists());
}

#[tokio::test]
async fn test_empty_server_list_is_rejected() {
    let harness = Harness::new();
    let err = assert_err!(
        harness
            .coordinator
            .deploy(&harness.project, &[], request("r1"), Cancellation::never())
            .await
    );
    assert!(matches!(err, DeployError::ValidationError(_)));
}

#[tokio::test]
async fn test_deploy_to_every_server() {
    let harness = Harness::new();
    harness.folders.add(&harness.project, "uploads").unwrap();
    let web1 = harness.add_provisioned_server("web-1").await;
    let web2 = harness.add_provisioned_server("web-2").await;

    let report = assert_ok!(
        harness
            .coordinator
            .deploy(
                &harness.project,
                &[web1.clone(), web2.clone()],
                request("r1"),
                Cancellation::never(),
            )
            .await
    );

    assert_eq!(report.status, DeploymentStatus::Success);
    assert_eq!(report.project_id, harness.project.id);
    for (server, name) in [(&web1, "web-1"), (&web2, "web-2")] {
        let entry = report.server(server.id).unwrap();
        assert_eq!(entry.status, Some(ReleaseStatus::Active));
        assert_eq!(entry.release_id, Some(ReleaseId::parse("r1").unwrap()));

        let root = harness.server_root(name);
        assert_eq!(link_target(&root.join("current")), PathBuf::from("releases/r1"));
        assert_eq!(
            link_target(&root.join("releases/r1/uploads")),
            PathBuf::from("../../shared/uploads")
        );
    }

    assert_eq!(
        harness.queue.tasks(),
        vec![
            Task::PruneReleases {
                project_id: harness.project.id,
                server_id: web1.id,
            },
            Task::PruneReleases {
                project_id: harness.project.id,
                server_id: web2.id,
            },
        ]
    );
}

#[tokio::test]
async fn test_one_failing_server_does_not_stop_the_others() {
    let harness = Harness::new();
    let web1 = harness.add_provisioned_server("web-1").await;
    let web2 = harness.add_provisioned_server("web-2").await;

    // A plain file where web-2's release directory would go
    let broken = harness.server_root("web-2").join("releases");
    std::fs::create_dir_all(&broken).unwrap();
    std::fs::write(broken.join("r1"), "in the way").unwrap();

    let report = assert_ok!(
        harness
            .coordinator
            .deploy(
                &harness.project,
                &[web1.clone(), web2.clone()],
                request("r1"),
                Cancellation::never(),
            )
            .await
    );
    assert_eq!(report.status, DeploymentStatus::Partial);

    let ok = report.server(web1.id).unwrap();
    assert!(ok.succeeded());
    assert_eq!(ok.status, Some(ReleaseStatus::Active));

    let failed = report.server(web2.id).unwrap();
    assert!(!failed.succeeded());
    assert_eq!(failed.status, Some(ReleaseStatus::Failed));
    assert_eq!(failed.failed_in, Some(ReleaseStatus::Building));
    let summary = failed.error.as_deref().unwrap();
    assert!(!summary.contains(&harness.tmp.path().display().to_string()));

    // Only the healthy server gets a pruning pass
    assert_eq!(
        harness.queue.tasks(),
        vec![Task::PruneReleases {
            project_id: harness.project.id,
            server_id: web1.id,
        }]
    );
}

#[tokio::test]
async fn test_second_pipeline_on_same_server_is_busy() {
    let harness = Harness::new();
    let server = harness.add_provisioned_server("web-1").await;
    let servers = [server.clone()];
    let cancel = Cancellation::never();
    let first_request = request("r1");
    let second_request = request("r2");

    let (first, second) = tokio::join!(
        harness
            .fleet
            .deploy(&servers, &[], &first_request, &cancel),
        harness
            .fleet
            .deploy(&servers, &[], &second_request, &cancel),
    );

    assert!(first[0].result.is_ok());
    assert!(matches!(
        second[0].result,
        Err(DeployError::ServerBusyError(id)) if id == server.id
    ));

    // The lock is released once the first pipeline is done
    let third = harness
        .fleet
        .deploy(&servers, &[], &request("r3"), &cancel)
        .await;
    assert!(third[0].result.is_ok());
}

#[tokio::test]
async fn test_rollback_and_prune_across_servers() {
    let harness = Harness::new();
    let web1 = harness.add_provisioned_server("web-1").await;
    let web2 = harness.add_provisioned_server("web-2").await;
    let servers = [web1.clone(), web2.clone()];

    for raw in ["r1", "r2"] {
        let report = assert_ok!(
            harness
                .coordinator
                .deploy(&harness.project, &servers, request(raw), Cancellation::never())
                .await
        );
        assert_eq!(report.status, DeploymentStatus::Success);
    }

    let report = assert_ok!(
        harness
            .coordinator
            .rollback(&harness.project, &servers, None)
            .await
    );
    assert_eq!(report.status, DeploymentStatus::Success);
    for name in ["web-1", "web-2"] {
        assert_eq!(
            link_target(&harness.server_root(name).join("current")),
            PathBuf::from("releases/r1")
        );
    }

    // Defaults keep five releases, so nothing is old enough yet
    let reports = assert_ok!(harness.coordinator.prune(&harness.project, &servers).await);
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.error.is_none() && r.purged.is_empty()));

    // An unknown target fails per server, not up front
    let report = assert_ok!(
        harness
            .coordinator
            .rollback(
                &harness.project,
                &servers,
                Some(ReleaseId::parse("r9").unwrap())
            )
            .await
    );
    assert_eq!(report.status, DeploymentStatus::Failed);
    assert!(report.servers.iter().all(|s| s.failed_in.is_none()));
}
