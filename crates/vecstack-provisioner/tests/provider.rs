mod common;

use vecstack_provisioner::manifest::Desired;
use vecstack_provisioner::{
    Cancellation, ConnectionSupervisor, FailureReason, ReconciliationResult, ResourceProvider,
    ResourceSpec,
};

use common::{CREATE_COLLECTION, FakeRemote, retry, stack};

fn collection_spec() -> ResourceSpec {
    stack()
        .specs
        .into_iter()
        .find(|s| s.name == "vector-collection")
        .unwrap()
}

fn provider(remote: &FakeRemote) -> ResourceProvider {
    ResourceProvider::new(ConnectionSupervisor::new(remote.connector(), retry(5)))
}

#[tokio::test(start_paused = true)]
async fn second_ensure_reports_already_exists() {
    let remote = FakeRemote::new();
    let provider = provider(&remote);
    let spec = collection_spec();

    let first = provider.ensure(&spec, &Cancellation::never()).await;
    assert!(matches!(first, ReconciliationResult::Created { .. }));

    let second = provider.ensure(&spec, &Cancellation::never()).await;
    assert_eq!(second, ReconciliationResult::AlreadyExists);
    assert!(second.is_success());
    assert_eq!(remote.live_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn preexisting_object_is_not_an_error() {
    let remote = FakeRemote::new().with_existing(CREATE_COLLECTION);
    let result = provider(&remote)
        .ensure(&collection_spec(), &Cancellation::never())
        .await;

    assert_eq!(result, ReconciliationResult::AlreadyExists);
}

#[tokio::test(start_paused = true)]
async fn invalid_spec_fails_before_any_connection() {
    let remote = FakeRemote::new();
    let mut spec = collection_spec();
    if let Desired::Collection(coll) = &mut spec.desired {
        coll.database.clear();
    }

    let result = provider(&remote).ensure(&spec, &Cancellation::never()).await;

    match result {
        ReconciliationResult::Failed(FailureReason::InvalidSpec(reason)) => {
            assert!(reason.contains("database"), "{reason}");
        }
        other => panic!("expected InvalidSpec, got {other:?}"),
    }
    assert_eq!(remote.opens(), 0);
}

#[tokio::test(start_paused = true)]
async fn remote_rejection_names_the_resource_and_releases_the_session() {
    let remote = FakeRemote::new().failing(CREATE_COLLECTION, "not authorized on ww to execute command");

    let result = provider(&remote)
        .ensure(&collection_spec(), &Cancellation::never())
        .await;

    match result {
        ReconciliationResult::Failed(FailureReason::RemoteOperationFailed(msg)) => {
            assert!(msg.contains("vector-collection"), "{msg}");
            assert!(msg.contains("not authorized"), "{msg}");
        }
        other => panic!("expected RemoteOperationFailed, got {other:?}"),
    }
    assert_eq!(remote.live_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn exhausted_auth_race_fails_the_node() {
    let remote = FakeRemote::new().with_auth_races(100);

    let result = provider(&remote)
        .ensure(&collection_spec(), &Cancellation::never())
        .await;

    assert_eq!(
        result,
        ReconciliationResult::Failed(FailureReason::AuthExhausted { attempts: 5 })
    );
    assert!(!remote.executed(CREATE_COLLECTION));
}

#[tokio::test(start_paused = true)]
async fn cancelled_before_start_never_executes() {
    let remote = FakeRemote::new();
    let (handle, cancel) = Cancellation::new();
    handle.cancel();

    let result = provider(&remote).ensure(&collection_spec(), &cancel).await;

    assert!(matches!(
        result,
        ReconciliationResult::Failed(FailureReason::Cancelled(_))
    ));
    assert_eq!(remote.opens(), 0);
}

#[tokio::test(start_paused = true)]
async fn rejected_credentials_are_reported_as_auth_not_connect() {
    let remote = FakeRemote::new().with_permanent_auth_failure();

    let result = provider(&remote)
        .ensure(&collection_spec(), &Cancellation::never())
        .await;

    match result {
        ReconciliationResult::Failed(reason @ FailureReason::Auth(_)) => {
            assert!(reason.to_string().starts_with("authentication rejected"), "{reason}");
            assert!(reason.to_string().contains("vector-collection"), "{reason}");
        }
        other => panic!("expected Auth, got {other:?}"),
    }
    assert_eq!(remote.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn unreachable_endpoint_is_reported_as_connect() {
    let remote = FakeRemote::new().with_connect_failure("server selection timeout");

    let result = provider(&remote)
        .ensure(&collection_spec(), &Cancellation::never())
        .await;

    assert!(matches!(
        result,
        ReconciliationResult::Failed(FailureReason::Connect(_))
    ));
}
