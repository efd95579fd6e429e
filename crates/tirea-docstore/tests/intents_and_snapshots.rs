//! Intent dispatch and persisted snapshot restore.

use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tirea_docstore::{
    path,
    query::Query,
    CommitSource, DispatchOptions, DocumentStore, EventSpec, IntentOutput, MutationPatch,
    PatchWriter, SnapshotStrategy,
};

fn todo_store() -> DocumentStore {
    let store = DocumentStore::new(json!({"todos": []})).unwrap();
    let _sub = store.register_intent("todo.add", |payload, ctx| {
        let title = payload.get("title")?.as_str()?;
        let count = ctx
            .query(&Query::from_json(json!({"todos": true})), None)
            .ok()?["todos"]
            .as_array()
            .map_or(0, Vec::len);
        let mut w = PatchWriter::new();
        w.set(path!("todos", count), json!({"title": title, "done": false}));
        Some(
            IntentOutput::new(w.build())
                .with_metadata(json!({"undoable": true, "by": "producer"}))
                .with_event(EventSpec::default().with_payload(json!({"title": title}))),
        )
    });
    store
}

#[test]
fn test_dispatch_commits_produced_patch() {
    let store = todo_store();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let _events = store.on_event(move |event| sink.lock().unwrap().push(event.clone()));

    let record = store
        .dispatch_intent(
            "todo.add",
            json!({"title": "write tests"}),
            DispatchOptions::new().metadata(json!({"by": "caller"})),
        )
        .unwrap()
        .unwrap();

    assert_eq!(record.source, CommitSource::Intent);
    assert_eq!(record.intent.as_ref().unwrap().name, "todo.add");
    assert_eq!(record.metadata, Some(json!({"undoable": true, "by": "caller"})));
    assert_eq!(store.state()["todos"][0]["title"], "write tests");

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, "todo.add");
    assert_eq!(events[0].payload, json!({"title": "write tests"}));
    assert_eq!(events[0].commit_id, record.id);
}

#[test]
fn test_dispatch_without_producer_or_output() {
    let store = todo_store();
    assert!(store
        .dispatch_intent("missing", Value::Null, DispatchOptions::new())
        .unwrap()
        .is_none());
    assert!(store
        .dispatch_intent("todo.add", json!({"no": "title"}), DispatchOptions::new())
        .unwrap()
        .is_none());
    assert!(store.commit_log().is_empty());
}

#[test]
fn test_dispatch_overrides_and_unregister() {
    let store = DocumentStore::new(json!({})).unwrap();
    let sub = store.register_intent("flag", |payload, _| {
        Some(MutationPatch::from(json!({"flag": payload.clone()})).into())
    });

    let record = store
        .dispatch_intent(
            "flag",
            true,
            DispatchOptions::new()
                .source("sync")
                .history_channel("flags")
                .event(EventSpec::new("flag.set")),
        )
        .unwrap()
        .unwrap();
    assert_eq!(record.source, CommitSource::Custom("sync".into()));
    assert_eq!(record.history_channel.as_deref(), Some("flags"));
    assert_eq!(record.event.as_ref().map(|e| e.kind.as_str()), Some("flag.set"));
    assert!(store.can_undo(Some("flags")));

    sub.unsubscribe();
    assert!(store
        .dispatch_intent("flag", false, DispatchOptions::new())
        .unwrap()
        .is_none());
}

#[test]
fn test_stale_intent_subscription_keeps_replacement() {
    let store = DocumentStore::new(json!({})).unwrap();
    let first = store.register_intent("x", |_, _| Some(MutationPatch::from(json!({"v": 1})).into()));
    let _second =
        store.register_intent("x", |_, _| Some(MutationPatch::from(json!({"v": 2})).into()));
    first.unsubscribe();

    store
        .dispatch_intent("x", Value::Null, DispatchOptions::new())
        .unwrap();
    assert_eq!(store.state()["v"], 2);
}

#[test]
fn test_snapshot_restores_into_fresh_store() {
    let source = todo_store();
    for title in ["a", "b"] {
        source
            .dispatch_intent("todo.add", json!({"title": title}), DispatchOptions::new())
            .unwrap();
    }

    let by_state = source
        .persisted_snapshot(SnapshotStrategy::State, None)
        .to_json_string()
        .unwrap();
    let by_commits = source
        .persisted_snapshot(SnapshotStrategy::Commits, None)
        .to_json_string()
        .unwrap();

    for text in [by_state, by_commits] {
        let target = DocumentStore::new(json!({"todos": []})).unwrap();
        assert!(target.restore_snapshot_str(&text));
        assert_eq!(target.state(), source.state());
        let last = target.commit_log().pop().unwrap();
        assert_eq!(last.source, CommitSource::External);
        assert_eq!(last.metadata.as_ref().unwrap()["restored"], true);
    }
}
