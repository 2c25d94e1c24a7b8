//! Integration tests for the session synchronizer
//!
//! Exercises the synchronizer end to end on a sled-backed store with an
//! in-memory mirror standing in for the remote service.

use std::sync::Arc;

use quire::identity::{IdentityProvider, ImportOutcome};
use quire::remote::{InMemoryMirror, MirrorCall, RemoteMirror};
use quire::storage::{
    LocalSessionStore, MemoryBackend, StorageBackend, ACTIVE_HISTORY_KEY, SESSIONS_KEY,
};
use quire::sync::{PullOutcome, SessionSynchronizer, SyncOptions, SyncState};
use tokio_util::sync::CancellationToken;

mod common;

fn open_sync(
    backend: Arc<dyn StorageBackend>,
    mirror: &InMemoryMirror,
    fingerprint: &str,
) -> SessionSynchronizer {
    SessionSynchronizer::open(
        LocalSessionStore::new(backend),
        Arc::new(mirror.clone()),
        fingerprint,
        SyncOptions::default(),
    )
    .expect("failed to open synchronizer")
}

#[tokio::test]
async fn test_session_lifecycle_on_sled() {
    let (backend, _tmp) = common::create_temp_backend();
    let mirror = InMemoryMirror::new();
    let sync = open_sync(backend.clone(), &mirror, "fp_lifecycle");

    let id = sync.create_session().unwrap();
    sync.rename_session(&id, "Oncology Notes").unwrap();
    sync.pin_session(&id, true).unwrap();
    sync.flush().await;

    let remote = mirror.get(&id).expect("session mirrored");
    assert_eq!(remote.title, "Oncology Notes");
    assert!(remote.pinned);
    assert_eq!(remote.fingerprint, "fp_lifecycle");
    assert_eq!(sync.sync_state(&id), SyncState::Synced);

    sync.delete_all().unwrap();
    sync.flush().await;

    assert!(sync.sessions().is_empty());
    assert!(backend.get(SESSIONS_KEY).unwrap().is_none());
    assert!(backend.get(ACTIVE_HISTORY_KEY).unwrap().is_none());
    assert!(mirror.is_empty());
    assert_eq!(
        mirror.calls().last(),
        Some(&MirrorCall::DeleteAll("fp_lifecycle".to_string()))
    );
}

#[test]
fn test_collection_survives_restart() {
    let (backend, _tmp) = common::create_temp_backend();
    let mirror = InMemoryMirror::new();

    let first = open_sync(backend.clone(), &mirror, "fp_restart");
    let pinned = first
        .save_current_session(&common::conversation("How does BRCA1 repair DNA?"))
        .unwrap()
        .unwrap();
    first.pin_session(&pinned, true).unwrap();
    let other = first.create_session().unwrap();
    drop(first);

    let second = open_sync(backend, &mirror, "fp_restart");
    let ids: Vec<String> = second.sessions().into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![pinned.clone(), other]);
    assert_eq!(
        second.session(&pinned).unwrap().title,
        "How does BRCA1 repair DNA?"
    );
    assert!(second.current_session_id().is_none());
}

#[test]
fn test_cap_holds_across_many_creations() {
    let (backend, _tmp) = common::create_temp_backend();
    let mirror = InMemoryMirror::new();
    let sync = open_sync(backend.clone(), &mirror, "fp_cap");

    let keep = sync.create_session().unwrap();
    sync.pin_session(&keep, true).unwrap();
    for _ in 0..60 {
        sync.create_session().unwrap();
    }

    let sessions = sync.sessions();
    assert_eq!(sessions.len(), 50);
    assert_eq!(sessions[0].id, keep);

    let stored = LocalSessionStore::new(backend).load_all().unwrap();
    assert_eq!(stored.len(), 50);
}

#[test]
fn test_corrupt_store_starts_empty() {
    let backend = MemoryBackend::new();
    backend
        .set(SESSIONS_KEY, r#"[{"id": "", "title": 42}]"#)
        .unwrap();
    let mirror = InMemoryMirror::new();
    let sync = open_sync(Arc::new(backend.clone()), &mirror, "fp_corrupt");
    assert!(sync.sessions().is_empty());

    let id = sync.create_session().unwrap();
    let stored = LocalSessionStore::new(Arc::new(backend)).load_all().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, id);
}

#[tokio::test]
async fn test_second_device_picks_up_sessions_after_import() {
    let mirror = InMemoryMirror::new();

    let laptop_backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let laptop_identity = IdentityProvider::new(laptop_backend.clone()).unwrap();
    let laptop_token = laptop_identity.get_identity().unwrap();
    let laptop = open_sync(laptop_backend, &mirror, &laptop_token);
    let id = laptop
        .save_current_session(&common::conversation("Summarise KRAS inhibitors"))
        .unwrap()
        .unwrap();
    laptop.flush().await;

    let phone_backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let phone_identity = IdentityProvider::new(phone_backend.clone()).unwrap();
    let phone_token = phone_identity.get_identity().unwrap();
    let phone = open_sync(phone_backend, &mirror, &phone_token);
    phone.pull_remote().await.unwrap();
    assert!(phone.sessions().is_empty());

    let export = laptop_identity.export().unwrap();
    let outcome = phone_identity.import_identity(&export.token).unwrap();
    assert!(outcome.requires_reload());
    assert_eq!(
        outcome,
        ImportOutcome::Replaced {
            previous: Some(phone_token)
        }
    );

    phone.reload(phone_identity.get_identity().unwrap()).unwrap();
    let pulled = phone.pull_remote().await.unwrap();
    assert!(matches!(pulled, PullOutcome::Merged { fetched: 1, .. }));
    assert_eq!(
        phone.session(&id).unwrap().title,
        "Summarise KRAS inhibitors"
    );
    assert_eq!(phone.sync_state(&id), SyncState::Synced);
}

#[tokio::test]
async fn test_remote_outage_keeps_working_locally() {
    let mirror = InMemoryMirror::new();
    mirror.set_failing(true);
    let sync = open_sync(Arc::new(MemoryBackend::new()), &mirror, "fp_outage");

    let outcome = sync.pull_remote().await.unwrap();
    assert!(matches!(outcome, PullOutcome::Unavailable { .. }));

    let id = sync.create_session().unwrap();
    sync.rename_session(&id, "Offline notes").unwrap();
    let summary = sync.flush().await;
    assert_eq!(summary.failed, 1);
    assert_eq!(sync.session(&id).unwrap().title, "Offline notes");
    assert_eq!(sync.sync_state(&id), SyncState::LocalOnly);

    mirror.set_failing(false);
    sync.rename_session(&id, "Back online").unwrap();
    sync.flush().await;
    assert_eq!(mirror.get(&id).unwrap().title, "Back online");
    assert_eq!(sync.sync_state(&id), SyncState::Synced);
}

#[tokio::test]
async fn test_background_worker_and_initial_sync() {
    let mirror = InMemoryMirror::new();
    let seeded = open_sync(Arc::new(MemoryBackend::new()), &mirror, "fp_bg");
    let remote_id = seeded
        .save_current_session(&common::conversation("Seeded elsewhere"))
        .unwrap()
        .unwrap();
    seeded.flush().await;

    let sync = Arc::new(open_sync(Arc::new(MemoryBackend::new()), &mirror, "fp_bg"));
    let cancel = CancellationToken::new();
    let worker = sync.spawn_worker(cancel.clone());

    let initial = sync.spawn_initial_sync().await.unwrap().unwrap();
    assert!(matches!(initial, PullOutcome::Merged { fetched: 1, .. }));
    assert!(sync.session(&remote_id).is_some());

    let id = sync.create_session().unwrap();
    for _ in 0..100 {
        if mirror.get(&id).is_some() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert!(mirror.get(&id).is_some());
    assert_eq!(mirror.load_sessions("fp_bg").await.unwrap().len(), 2);

    cancel.cancel();
    worker.await.unwrap();
}
