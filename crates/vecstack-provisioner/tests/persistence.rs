mod common;

use vecstack_provisioner::state::ResourceStatus;
use vecstack_provisioner::{
    Cancellation, CredentialRef, IndexStatus, Manifest, ProvisionerError, ProvisionerState,
    Settings, StatePersistence, provision,
};

use common::{CREATE_COLLECTION, CREATE_USER, FakeRemote, PASSWORD, stack};

#[tokio::test]
async fn missing_journal_loads_as_fresh_state() {
    let dir = tempfile::tempdir().unwrap();
    let journal = StatePersistence::new(dir.path().join("state.json"));

    let state = journal.load().await.unwrap();
    assert!(state.resources.is_empty());
    assert!(state.manifest_version.is_none());
}

#[tokio::test]
async fn corrupt_journal_is_a_state_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, b"{ not json").unwrap();

    let err = StatePersistence::new(&path).load().await.unwrap_err();
    assert!(matches!(err, ProvisionerError::State(_)));
}

#[tokio::test]
async fn flush_creates_parent_directories_and_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let journal = StatePersistence::new(dir.path().join("nested/vecstack/state.json"));
    let state = ProvisionerState {
        manifest_version: Some(Manifest::VERSION),
        ..ProvisionerState::default()
    };

    journal.flush(&state).await.unwrap();
    let loaded = journal.load().await.unwrap();
    assert_eq!(loaded.manifest_version, Some(Manifest::VERSION));
    assert!(!dir.path().join("nested/vecstack/state.json.tmp").exists());
}

#[tokio::test(start_paused = true)]
async fn run_journals_every_node_without_secrets() {
    let dir = tempfile::tempdir().unwrap();
    let journal = StatePersistence::new(dir.path().join("state.json"));
    let remote = FakeRemote::new().with_existing(CREATE_COLLECTION);

    provision(
        &stack(),
        remote.connector(),
        &Settings::default(),
        Some(&journal),
        &CredentialRef::env("VECTOR_PASSWORD"),
        &Cancellation::never(),
    )
    .await
    .unwrap();

    let state = journal.load().await.unwrap();
    assert_eq!(state.manifest_version, Some(Manifest::VERSION));
    assert!(state.last_run.is_some());
    assert_eq!(state.resources.len(), 5);

    let collection = &state.resources["collection.vector-collection"];
    assert_eq!(collection.status, ResourceStatus::AlreadyExists);
    let index = &state.resources["search_index.vector-index"];
    assert_eq!(index.status, ResourceStatus::Created);
    assert_eq!(index.readiness, Some(IndexStatus::Steady));

    let raw = std::fs::read_to_string(&journal.local_path).unwrap();
    assert!(!raw.contains(PASSWORD));
}

#[tokio::test(start_paused = true)]
async fn journal_records_failures_and_skips() {
    let dir = tempfile::tempdir().unwrap();
    let journal = StatePersistence::new(dir.path().join("state.json"));
    let remote = FakeRemote::new().failing(CREATE_USER, "USER_QUOTA_EXCEEDED");

    let result = provision(
        &stack(),
        remote.connector(),
        &Settings::default(),
        Some(&journal),
        &CredentialRef::env("VECTOR_PASSWORD"),
        &Cancellation::never(),
    )
    .await;
    assert!(result.is_err());

    let state = journal.load().await.unwrap();
    let user = &state.resources["database_user.vector-user"];
    assert_eq!(user.status, ResourceStatus::Failed);
    assert!(user.detail.as_deref().unwrap_or_default().contains("USER_QUOTA_EXCEEDED"));
    assert_eq!(
        state.resources["search_index.vector-index"].status,
        ResourceStatus::Skipped
    );
}
