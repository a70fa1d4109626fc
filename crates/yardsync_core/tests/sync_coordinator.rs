use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use uuid::Uuid;
use yardsync_core::model::record::fields;
use yardsync_core::store::Revision;
use yardsync_core::sync::{
    Credentials, LoopbackRemote, RetryPolicy, StatusSubscription, SyncConfig, SyncCoordinator,
    SyncDirection, SyncState, TransportError,
};
use yardsync_core::{DocumentStore, RecordType};

const ENDPOINT: &str = "ws://loopback.test:4984/yard";

fn credentials() -> Credentials {
    Credentials::new("yard", "secret")
}

fn fast_config() -> SyncConfig {
    let mut config = SyncConfig::new(ENDPOINT, credentials());
    config.poll_interval = Duration::from_millis(20);
    config.retry = RetryPolicy {
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(40),
    };
    config
}

fn coordinator(remote: &LoopbackRemote, store: &DocumentStore) -> SyncCoordinator {
    SyncCoordinator::new(store.clone(), Arc::new(remote.transport()))
}

/// Collects states until `target` arrives.
async fn wait_for(subscription: &mut StatusSubscription, target: SyncState) -> Vec<SyncState> {
    timeout(Duration::from_secs(5), async {
        let mut seen = Vec::new();
        while let Some(event) = subscription.recv().await {
            assert_eq!(event.status, event.state.status_text());
            let done = event.state == target;
            seen.push(event.state);
            if done {
                break;
            }
        }
        seen
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {target:?}"))
}

fn assert_no_repeats(states: &[SyncState]) {
    for pair in states.windows(2) {
        assert_ne!(pair[0], pair[1], "repeated state in {states:?}");
    }
}

#[tokio::test]
async fn start_then_stop_emits_ordered_events_ending_in_stopped() {
    let store = DocumentStore::open_in_memory().unwrap();
    let remote = LoopbackRemote::new();
    let sync = coordinator(&remote, &store);
    let mut events = sync.subscribe();

    sync.start(fast_config()).await.unwrap();
    sync.stop().await;

    let states: Vec<_> = events.drain().into_iter().map(|event| event.state).collect();
    assert_eq!(states.first(), Some(&SyncState::Connecting));
    assert_eq!(states.last(), Some(&SyncState::Stopped));
    assert_eq!(
        states.iter().filter(|state| **state == SyncState::Stopped).count(),
        1
    );
    assert_no_repeats(&states);
    assert_eq!(sync.status(), "Stopped");
    assert!(!sync.is_syncing());
    assert_eq!(remote.open_sessions(), 0);
}

#[tokio::test]
async fn stop_without_session_emits_nothing() {
    let store = DocumentStore::open_in_memory().unwrap();
    let sync = coordinator(&LoopbackRemote::new(), &store);
    let mut events = sync.subscribe();

    sync.stop().await;
    sync.stop().await;

    assert!(events.drain().is_empty());
    assert_eq!(sync.state(), SyncState::Disconnected);
    assert_eq!(sync.status(), "Not Connected");
}

#[tokio::test]
async fn invalid_config_fails_synchronously_without_events() {
    let store = DocumentStore::open_in_memory().unwrap();
    let sync = coordinator(&LoopbackRemote::new(), &store);
    let mut events = sync.subscribe();

    let mut config = fast_config();
    config.endpoint = "ftp://loopback.test/yard".to_string();
    let err = sync.start(config).await.unwrap_err();

    assert_eq!(err.code(), "configuration_error");
    assert!(events.drain().is_empty());
    assert!(!sync.has_session().await);
}

#[tokio::test]
async fn one_shot_push_uploads_pending_records_then_stops() {
    let store = DocumentStore::open_in_memory().unwrap();
    let id = store
        .create(
            RecordType::Wagon,
            fields([("wagonNumber", "WGN-1001"), ("status", "Available")]),
        )
        .unwrap();
    let remote = LoopbackRemote::new();
    let sync = coordinator(&remote, &store);
    let mut events = sync.subscribe();

    sync.start(fast_config().one_shot()).await.unwrap();
    let states = wait_for(&mut events, SyncState::Stopped).await;

    assert_eq!(
        states,
        vec![
            SyncState::Connecting,
            SyncState::Busy,
            SyncState::Idle,
            SyncState::Stopped
        ]
    );
    let pushed = remote.document(id).unwrap();
    assert_eq!(pushed.fields, store.get_by_id(id).unwrap().unwrap().fields);
    assert!(store.pending_changes(10).unwrap().is_empty());

    sync.stop().await;
    assert!(events.drain().is_empty());
}

#[tokio::test]
async fn continuous_session_pushes_new_local_writes() {
    let store = DocumentStore::open_in_memory().unwrap();
    let remote = LoopbackRemote::new();
    let sync = coordinator(&remote, &store);
    let mut events = sync.subscribe();

    sync.start(fast_config()).await.unwrap();
    wait_for(&mut events, SyncState::Idle).await;
    assert!(sync.is_syncing());

    let id = store
        .create(RecordType::Task, fields([("title", "inspect WGN-7")]))
        .unwrap();
    timeout(Duration::from_secs(5), async {
        while remote.document(id).is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    store.delete(id).unwrap();
    timeout(Duration::from_secs(5), async {
        while !remote.document(id).is_some_and(|revision| revision.is_deleted) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    sync.stop().await;
    assert_eq!(remote.open_sessions(), 0);
}

#[tokio::test]
async fn bidirectional_session_pulls_without_echoing_back() {
    let store = DocumentStore::open_in_memory().unwrap();
    let remote = LoopbackRemote::new();
    let id = Uuid::new_v4();
    remote.inject(Revision {
        id,
        kind: RecordType::Task,
        created_at: 10,
        updated_at: 10,
        sequence: 1,
        fields: fields([("title", "from the office")]),
        is_deleted: false,
    });
    let sync = coordinator(&remote, &store);
    let mut events = sync.subscribe();

    sync.start(
        fast_config()
            .with_direction(SyncDirection::PushAndPull)
            .one_shot(),
    )
    .await
    .unwrap();
    wait_for(&mut events, SyncState::Stopped).await;

    assert!(store.get_by_id(id).unwrap().is_some());
    assert!(store.pending_changes(10).unwrap().is_empty());
    assert_eq!(remote.log_len(), 1);
    assert_eq!(store.checkpoint(ENDPOINT).unwrap().as_deref(), Some("1"));
}

#[tokio::test]
async fn push_only_session_never_pulls() {
    let store = DocumentStore::open_in_memory().unwrap();
    let remote = LoopbackRemote::new();
    let id = Uuid::new_v4();
    remote.inject(Revision {
        id,
        kind: RecordType::Task,
        created_at: 10,
        updated_at: 10,
        sequence: 1,
        fields: fields([("title", "remote only")]),
        is_deleted: false,
    });
    let sync = coordinator(&remote, &store);
    let mut events = sync.subscribe();

    sync.start(fast_config().one_shot()).await.unwrap();
    wait_for(&mut events, SyncState::Stopped).await;

    assert!(store.get_by_id(id).unwrap().is_none());
}

#[tokio::test]
async fn offline_remote_is_retried_until_reachable() {
    let store = DocumentStore::open_in_memory().unwrap();
    let remote = LoopbackRemote::new();
    remote.set_offline(true);
    let sync = coordinator(&remote, &store);
    let mut events = sync.subscribe();

    sync.start(fast_config()).await.unwrap();
    let before = wait_for(&mut events, SyncState::Offline).await;
    assert_eq!(before, vec![SyncState::Connecting, SyncState::Offline]);
    assert_eq!(sync.status(), "Offline");

    remote.set_offline(false);
    let after = wait_for(&mut events, SyncState::Idle).await;
    assert_no_repeats(&after);
    assert!(remote.connect_count() >= 2);

    sync.stop().await;
}

#[tokio::test]
async fn rejected_credentials_surface_as_error_status() {
    let store = DocumentStore::open_in_memory().unwrap();
    let remote = LoopbackRemote::with_credentials(Credentials::new("yard", "other"));
    let sync = coordinator(&remote, &store);
    let mut events = sync.subscribe();

    sync.start(fast_config()).await.unwrap();
    let expected = SyncState::Error("credentials rejected".to_string());
    wait_for(&mut events, expected.clone()).await;
    assert_eq!(sync.status(), "Error: credentials rejected");

    sync.stop().await;
    let tail: Vec<_> = events.drain().into_iter().map(|event| event.state).collect();
    assert_eq!(tail.last(), Some(&SyncState::Stopped));
}

#[tokio::test]
async fn failed_push_is_retried_on_a_new_connection() {
    let store = DocumentStore::open_in_memory().unwrap();
    let id = store.create(RecordType::Task, fields([("title", "retry me")])).unwrap();
    let remote = LoopbackRemote::new();
    remote.fail_next_push(TransportError::network("connection reset"));
    let sync = coordinator(&remote, &store);
    let mut events = sync.subscribe();

    sync.start(fast_config()).await.unwrap();
    wait_for(&mut events, SyncState::Offline).await;
    wait_for(&mut events, SyncState::Idle).await;

    assert!(remote.document(id).is_some());
    assert_eq!(remote.connect_count(), 2);
    sync.stop().await;
}

#[tokio::test]
async fn restart_quiesces_previous_session_first() {
    let store = DocumentStore::open_in_memory().unwrap();
    let remote = LoopbackRemote::new();
    let sync = coordinator(&remote, &store);
    let mut events = sync.subscribe();

    sync.start(fast_config()).await.unwrap();
    wait_for(&mut events, SyncState::Idle).await;

    sync.start(fast_config()).await.unwrap();
    let restart = wait_for(&mut events, SyncState::Idle).await;
    assert_eq!(
        restart,
        vec![SyncState::Stopped, SyncState::Connecting, SyncState::Idle]
    );
    assert_eq!(remote.open_sessions(), 1);

    sync.stop().await;
    assert_eq!(remote.open_sessions(), 0);
}

#[tokio::test]
async fn rapid_start_stop_cycles_stay_well_ordered() {
    let store = DocumentStore::open_in_memory().unwrap();
    let remote = LoopbackRemote::new();
    let sync = coordinator(&remote, &store);
    let mut events = sync.subscribe();

    for _ in 0..10 {
        sync.start(fast_config()).await.unwrap();
        sync.stop().await;
    }

    let states: Vec<_> = events.drain().into_iter().map(|event| event.state).collect();
    assert_no_repeats(&states);
    assert_eq!(
        states.iter().filter(|state| **state == SyncState::Stopped).count(),
        10
    );
    assert_eq!(
        states.iter().filter(|state| **state == SyncState::Connecting).count(),
        10
    );
    assert_eq!(remote.open_sessions(), 0);
}

#[tokio::test]
async fn store_contention_does_not_stall_the_runtime() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("yard.sqlite3");
    let store = DocumentStore::open(&path).unwrap();
    store
        .create(RecordType::Task, fields([("title", "queued")]))
        .unwrap();
    let remote = LoopbackRemote::new();
    let sync = coordinator(&remote, &store);
    let mut events = sync.subscribe();

    // Another process holds the write lock; the worker's writes wait on it.
    let other = rusqlite::Connection::open(&path).unwrap();
    other.execute_batch("BEGIN EXCLUSIVE;").unwrap();

    sync.start(fast_config().one_shot()).await.unwrap();
    for _ in 0..10 {
        let tick = std::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(tick.elapsed() < Duration::from_secs(1));
    }
    other.execute_batch("COMMIT;").unwrap();

    let states = wait_for(&mut events, SyncState::Stopped).await;
    assert!(states.contains(&SyncState::Idle), "{states:?}");
    assert_eq!(remote.documents().len(), 1);
    assert!(store.pending_changes(10).unwrap().is_empty());
    sync.stop().await;
}

#[tokio::test]
async fn successful_push_compacts_tombstones_and_old_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("yard.sqlite3");
    let store = DocumentStore::open(&path).unwrap();

    let gone = store
        .create(RecordType::Task, fields([("title", "scrap")]))
        .unwrap();
    store.delete(gone).unwrap();

    let contested = store
        .create(RecordType::Task, fields([("title", "local")]))
        .unwrap();
    let local = store.get_by_id(contested).unwrap().unwrap();
    let remote_edit = Revision {
        id: contested,
        kind: RecordType::Task,
        created_at: local.created_at,
        updated_at: local.updated_at + 1_000,
        sequence: 1,
        fields: fields([("title", "remote")]),
        is_deleted: false,
    };
    store
        .apply_remote(&remote_edit, &yardsync_core::sync::LastWriterWins)
        .unwrap();
    assert_eq!(store.conflicts_for(contested).unwrap().len(), 1);
    std::thread::sleep(Duration::from_millis(5));

    let remote = LoopbackRemote::new();
    let sync = coordinator(&remote, &store);
    let mut events = sync.subscribe();
    let mut config = fast_config().one_shot();
    config.conflict_retention = Duration::ZERO;
    sync.start(config).await.unwrap();
    wait_for(&mut events, SyncState::Stopped).await;

    assert!(remote.document(gone).unwrap().is_deleted);
    let raw = rusqlite::Connection::open(&path).unwrap();
    let stored: i64 = raw
        .query_row("SELECT COUNT(*) FROM records WHERE id = ?1;", [gone.to_string()], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(stored, 0);
    assert!(store.conflicts_for(contested).unwrap().is_empty());
    sync.stop().await;
}
