//! Release FSM tests

use deployer::deploy::fsm::ReleaseEvent;
use deployer::models::release::{Release, ReleaseId, ReleaseStatus};

fn release() -> Release {
    Release::pending(ReleaseId::parse("2024-01-01T00:00").unwrap())
}

#[test]
fn test_fsm_initial_state() {
    let release = release();
    assert_eq!(release.status, ReleaseStatus::Pending);
    assert!(release.error.is_none());
    assert!(release.failed_in.is_none());
}

#[test]
fn test_fsm_deploy_success_flow() {
    let mut release = release();

    // Pending -> Building
    release.process(ReleaseEvent::Build).unwrap();
    assert_eq!(release.status, ReleaseStatus::Building);

    // Building -> FoldersLinked
    release.process(ReleaseEvent::LinkFolders).unwrap();
    assert_eq!(release.status, ReleaseStatus::FoldersLinked);

    // FoldersLinked -> Active
    release.process(ReleaseEvent::Activate).unwrap();
    assert_eq!(release.status, ReleaseStatus::Active);
}

#[test]
fn test_fsm_failure_records_state() {
    for (steps, failed_in) in [
        (0, ReleaseStatus::Building),
        (1, ReleaseStatus::FoldersLinked),
        (2, ReleaseStatus::Active),
    ] {
        let mut release = release();
        let events = [ReleaseEvent::Build, ReleaseEvent::LinkFolders];
        for event in events.into_iter().take(steps) {
            release.process(event).unwrap();
        }

        release
            .process(ReleaseEvent::Fail("boom".to_string()))
            .unwrap();
        assert_eq!(release.status, ReleaseStatus::Failed);
        assert_eq!(release.failed_in, Some(failed_in));
        assert_eq!(release.error.as_deref(), Some("boom"));
    }
}

#[test]
fn test_fsm_no_retry_after_failure() {
    let mut release = release();
    release.process(ReleaseEvent::Fail("boom".to_string())).unwrap();

    assert!(release.process(ReleaseEvent::Build).is_err());
    assert!(release.process(ReleaseEvent::Reinstate).is_err());
    assert_eq!(release.status, ReleaseStatus::Failed);
}

#[test]
fn test_fsm_rollback_only_from_inactive() {
    let mut release = release();
    assert!(release.process(ReleaseEvent::Reinstate).is_err());

    release.process(ReleaseEvent::Build).unwrap();
    release.process(ReleaseEvent::LinkFolders).unwrap();
    release.process(ReleaseEvent::Activate).unwrap();
    release.process(ReleaseEvent::Supersede).unwrap();
    assert_eq!(release.status, ReleaseStatus::Inactive);

    release.process(ReleaseEvent::Reinstate).unwrap();
    assert_eq!(release.status, ReleaseStatus::Active);
}
