//! Key store tests

use std::sync::atomic::Ordering;

use tokio_test::{assert_err, assert_ok};

use deployer::errors::DeployError;
use deployer::keys::{PRIVATE_KEY_FILE, PUBLIC_KEY_FILE};
use deployer::storage::records::ServerRepository;
use deployer::tasks::Task;

use crate::common::{FakeKeygen, Harness, PUBLIC_KEY};

#[tokio::test]
async fn test_provision_stores_public_key_only_on_record() {
    let harness = Harness::new();
    let mut server = harness.add_server("web-1").await;
    assert!(!harness.keys.has_credentials(&server).await);

    let key = assert_ok!(harness.keys.provision(&mut server).await);

    assert!(key.as_str().starts_with(PUBLIC_KEY));
    assert!(!key.as_str().contains("PRIVATE KEY"));
    assert_eq!(server.public_key.as_deref(), Some(key.as_str()));

    let record = harness.records.get(server.id).await.unwrap().unwrap();
    assert_eq!(record.public_key.as_deref(), Some(key.as_str()));
    assert!(!record.public_key.unwrap().contains("PRIVATE KEY"));

    let dir = harness.key_dir(&server);
    assert!(dir.join(PRIVATE_KEY_FILE).exists());
    assert!(!dir.join(PUBLIC_KEY_FILE).exists());
    assert!(harness.keys.has_credentials(&server).await);
}

#[cfg(unix)]
#[tokio::test]
async fn test_provision_restricts_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let harness = Harness::new();
    let server = harness.add_provisioned_server("web-1").await;
    let dir = harness.key_dir(&server);

    let dir_mode = std::fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
    let key_mode = std::fs::metadata(dir.join(PRIVATE_KEY_FILE))
        .unwrap()
        .permissions()
        .mode()
        & 0o777;
    assert_eq!(dir_mode, 0o700);
    assert_eq!(key_mode, 0o600);
}

#[tokio::test]
async fn test_provision_reuses_stale_key_directory() {
    let harness = Harness::new();
    let mut server = harness.add_server("web-1").await;

    let dir = harness.key_dir(&server);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(PRIVATE_KEY_FILE), "old private").unwrap();
    std::fs::write(dir.join(PUBLIC_KEY_FILE), "old public").unwrap();

    assert_ok!(harness.keys.provision(&mut server).await);
    assert_eq!(harness.keygen.calls.load(Ordering::SeqCst), 1);
    assert!(!dir.join(PUBLIC_KEY_FILE).exists());
    assert_ne!(
        std::fs::read_to_string(dir.join(PRIVATE_KEY_FILE)).unwrap(),
        "old private"
    );
}

#[tokio::test]
async fn test_missing_public_key_is_generation_error() {
    let harness = Harness::with_keygen(FakeKeygen::without_public_key());
    let mut server = harness.add_server("web-1").await;

    let err = assert_err!(harness.keys.provision(&mut server).await);
    assert!(matches!(err, DeployError::KeyGenerationError(_)));

    let record = harness.records.get(server.id).await.unwrap().unwrap();
    assert!(record.public_key.is_none());
    assert!(!harness.keys.has_credentials(&record).await);
}

#[tokio::test]
async fn test_retire_only_enqueues() {
    let harness = Harness::new();
    let server = harness.add_provisioned_server("web-1").await;

    harness.keys.retire(server.id);

    assert_eq!(
        harness.queue.tasks(),
        vec![Task::RetireKeys {
            server_id: server.id
        }]
    );
    assert!(harness.key_dir(&server).exists());

    harness.keys.purge(server.id).await;
    assert!(!harness.key_dir(&server).exists());

    // Second purge hits a missing directory and only logs
    harness.keys.purge(server.id).await;
}

#[tokio::test]
async fn test_fleet_provision_skips_servers_with_credentials() {
    let harness = Harness::new();
    let ready = harness.add_provisioned_server("web-1").await;
    let bare = harness.add_server("web-2").await;
    assert_eq!(harness.keygen.calls.load(Ordering::SeqCst), 1);

    let servers = vec![
        harness.records.get(ready.id).await.unwrap().unwrap(),
        bare.clone(),
    ];
    let outcomes = harness
        .fleet
        .provision_keys(&servers, &harness.keys, false)
        .await;
    assert!(outcomes.iter().all(|o| o.result.is_ok()));

    // Only the bare server gets a new pair
    assert_eq!(harness.keygen.calls.load(Ordering::SeqCst), 2);
    let record = harness.records.get(bare.id).await.unwrap().unwrap();
    assert!(harness.keys.has_credentials(&record).await);
    assert!(harness.key_dir(&ready).join(PRIVATE_KEY_FILE).exists());

    let servers = harness.records.list_for_project(harness.project.id).await.unwrap();
    let outcomes = harness
        .fleet
        .provision_keys(&servers, &harness.keys, true)
        .await;
    assert!(outcomes.iter().all(|o| o.result.is_ok()));
    assert_eq!(harness.keygen.calls.load(Ordering::SeqCst), 4);
}
