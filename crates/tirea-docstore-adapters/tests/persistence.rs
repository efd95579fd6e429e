//! Debounced persistence against memory, file and misbehaving snapshot stores.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tirea_docstore::{CommitOptions, DocumentStore, SnapshotStrategy};
use tirea_docstore_adapters::{
    FileSnapshotStore, MemorySnapshotStore, PersistError, PersistenceAdapter, PersistenceOptions,
    SnapshotStore,
};

fn debounced(ms: u64) -> PersistenceOptions {
    PersistenceOptions::new().debounce(Duration::from_millis(ms))
}

async fn saved_state(snapshots: &dyn SnapshotStore) -> Value {
    let text = snapshots.load().await.unwrap().unwrap();
    let restored = DocumentStore::new(json!({})).unwrap();
    assert!(restored.restore_snapshot_str(&text));
    (*restored.state()).clone()
}

/// Delays every save so commits can land while one is running.
struct SlowStore {
    inner: MemorySnapshotStore,
    delay: Duration,
}

#[async_trait]
impl SnapshotStore for SlowStore {
    async fn load(&self) -> Result<Option<String>, PersistError> {
        self.inner.load().await
    }

    async fn save(&self, content: &str) -> Result<(), PersistError> {
        tokio::time::sleep(self.delay).await;
        self.inner.save(content).await
    }

    async fn clear(&self) -> Result<(), PersistError> {
        self.inner.clear().await
    }
}

struct FailingStore;

#[async_trait]
impl SnapshotStore for FailingStore {
    async fn load(&self) -> Result<Option<String>, PersistError> {
        Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "unreadable").into())
    }

    async fn save(&self, _content: &str) -> Result<(), PersistError> {
        Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into())
    }

    async fn clear(&self) -> Result<(), PersistError> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_burst_of_commits_saves_once() {
    let store = DocumentStore::new(json!({"n": 0})).unwrap();
    let snapshots = Arc::new(MemorySnapshotStore::new());
    let adapter = PersistenceAdapter::new(store.clone(), snapshots.clone(), debounced(50));
    adapter.attach().unwrap();

    for n in 1..=3 {
        store.commit(json!({"n": n}), CommitOptions::new()).unwrap();
    }
    assert!(adapter.has_pending());
    assert_eq!(snapshots.save_count(), 0);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(snapshots.save_count(), 1);
    assert_eq!(saved_state(snapshots.as_ref()).await, json!({"n": 3}));
}

#[tokio::test(start_paused = true)]
async fn test_commit_during_save_schedules_one_follow_up() {
    let store = DocumentStore::new(json!({"n": 0})).unwrap();
    let snapshots = Arc::new(SlowStore {
        inner: MemorySnapshotStore::new(),
        delay: Duration::from_millis(100),
    });
    let adapter = PersistenceAdapter::new(store.clone(), snapshots.clone(), debounced(50));
    adapter.attach().unwrap();

    store.commit(json!({"n": 1}), CommitOptions::new()).unwrap();
    // The save starts at 50ms and holds until 150ms.
    tokio::time::sleep(Duration::from_millis(60)).await;
    store.commit(json!({"n": 2}), CommitOptions::new()).unwrap();
    store.commit(json!({"n": 3}), CommitOptions::new()).unwrap();
    assert!(!adapter.has_pending());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(snapshots.inner.save_count(), 2);
    assert_eq!(saved_state(&snapshots.inner).await, json!({"n": 3}));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_and_detach_stop_saving() {
    let store = DocumentStore::new(json!({"n": 0})).unwrap();
    let snapshots = Arc::new(MemorySnapshotStore::new());
    let adapter = PersistenceAdapter::new(store.clone(), snapshots.clone(), debounced(50));
    adapter.attach().unwrap();

    store.commit(json!({"n": 1}), CommitOptions::new()).unwrap();
    adapter.cancel();
    assert!(!adapter.has_pending());
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(snapshots.save_count(), 0);

    adapter.detach();
    store.commit(json!({"n": 2}), CommitOptions::new()).unwrap();
    assert!(!adapter.has_pending());
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(snapshots.save_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_flush_runs_pending_save_immediately() {
    let store = DocumentStore::new(json!({"n": 0})).unwrap();
    let snapshots = Arc::new(MemorySnapshotStore::new());
    let adapter = PersistenceAdapter::new(store.clone(), snapshots.clone(), debounced(10_000));
    adapter.attach().unwrap();

    adapter.flush().await.unwrap();
    assert_eq!(snapshots.save_count(), 0);

    store.commit(json!({"n": 1}), CommitOptions::new()).unwrap();
    adapter.flush().await.unwrap();
    assert_eq!(snapshots.save_count(), 1);
    assert!(!adapter.has_pending());

    adapter.flush().await.unwrap();
    assert_eq!(snapshots.save_count(), 1);
}

#[tokio::test]
async fn test_commits_strategy_keeps_trailing_patches() {
    let store = DocumentStore::new(json!({"n": 0})).unwrap();
    for n in 1..=3 {
        store.commit(json!({"n": n}), CommitOptions::new()).unwrap();
    }
    let snapshots = Arc::new(MemorySnapshotStore::new());
    let adapter = PersistenceAdapter::new(
        store.clone(),
        snapshots.clone(),
        PersistenceOptions::new()
            .strategy(SnapshotStrategy::Commits)
            .max_commits(2),
    );
    adapter.save_now().await.unwrap();

    let text = snapshots.load().await.unwrap().unwrap();
    let snapshot: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(snapshot["version"], 1);
    assert_eq!(snapshot["strategy"], "commits");
    assert_eq!(snapshot["commits"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn test_load_restores_or_reports_false() {
    let source = DocumentStore::new(json!({"todos": ["a", "b"]})).unwrap();
    let text = source
        .persisted_snapshot(SnapshotStrategy::State, None)
        .to_json_string()
        .unwrap();

    let target = DocumentStore::new(json!({"todos": []})).unwrap();
    let adapter = PersistenceAdapter::new(
        target.clone(),
        Arc::new(MemorySnapshotStore::with_content(text)),
        PersistenceOptions::new(),
    );
    assert!(adapter.load().await);
    assert_eq!(target.state(), source.state());

    let empty = PersistenceAdapter::new(
        target.clone(),
        Arc::new(MemorySnapshotStore::new()),
        PersistenceOptions::new(),
    );
    assert!(!empty.load().await);

    let garbage = PersistenceAdapter::new(
        target.clone(),
        Arc::new(MemorySnapshotStore::with_content("not a snapshot")),
        PersistenceOptions::new(),
    );
    assert!(!garbage.load().await);
    assert_eq!(target.state(), source.state());
}

#[tokio::test]
async fn test_failures_reach_error_callback() {
    let store = DocumentStore::new(json!({})).unwrap();
    let adapter = PersistenceAdapter::new(store, Arc::new(FailingStore), PersistenceOptions::new());
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    adapter.on_error(move |e| sink.lock().unwrap().push(e.to_string()));

    assert!(matches!(adapter.save_now().await, Err(PersistError::Io(_))));
    assert!(!adapter.load().await);

    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 2);
    assert!(errors[0].contains("read-only"));
    assert!(errors[1].contains("unreadable"));
}

#[tokio::test]
async fn test_file_store_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let first = DocumentStore::new(json!({"doc": {"title": ""}})).unwrap();
    first
        .commit(json!({"doc": {"title": "draft"}}), CommitOptions::new())
        .unwrap();
    let adapter = PersistenceAdapter::new(
        first.clone(),
        Arc::new(FileSnapshotStore::new(temp_dir.path(), "doc").unwrap()),
        PersistenceOptions::new(),
    );
    adapter.save_now().await.unwrap();

    let second = DocumentStore::new(json!({"doc": {"title": ""}})).unwrap();
    let reloaded = PersistenceAdapter::new(
        second.clone(),
        Arc::new(FileSnapshotStore::new(temp_dir.path(), "doc").unwrap()),
        PersistenceOptions::new(),
    );
    assert!(reloaded.load().await);
    assert_eq!(second.state()["doc"]["title"], "draft");

    reloaded.clear().await.unwrap();
    assert!(!reloaded.load().await);
}

#[test]
fn test_attach_outside_runtime_fails() {
    let store = DocumentStore::new(json!({})).unwrap();
    let adapter = PersistenceAdapter::new(
        store,
        Arc::new(MemorySnapshotStore::new()),
        PersistenceOptions::new(),
    );
    assert!(matches!(adapter.attach(), Err(PersistError::Runtime(_))));
}
