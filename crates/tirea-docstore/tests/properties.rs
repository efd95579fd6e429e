//! Round-trip, idempotence, dependency soundness and history ordering over
//! a table of representative patches.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tirea_docstore::{
    deep_equal, path, query::Query, CommitOptions, DocumentStore, LinkSpec, MutationCommand,
    MutationPatch, PatchWriter, WatchOptions,
};

fn base_state() -> Value {
    json!({
        "count": 0,
        "user": {"name": "ada", "tags": ["x", "y"], "meta": {"age": 36}},
        "items": [{"id": 1}, {"id": 2}, {"id": 3}],
        "flag": null,
    })
}

fn patches() -> Vec<(&'static str, MutationPatch)> {
    let mut out = Vec::new();

    out.push(("implicit sets", MutationPatch::from(json!({"count": 3, "user": {"name": "bob"}}))));

    let mut w = PatchWriter::new();
    w.set(path!("deep", "new", "branch"), json!(1));
    w.set(path!("count", "inner"), json!(true));
    out.push(("auto-created containers over a scalar", w.build()));

    let mut w = PatchWriter::new();
    w.delete(path!("items", 0));
    w.set(path!("items", 5), json!({"id": 9}));
    out.push(("array splice and append past end", w.build()));

    let mut w = PatchWriter::new();
    w.merge(path!("user", "tags"), json!(["z"]));
    w.merge(path!("user", "meta"), json!({"age": 37, "city": "x"}));
    w.delete(path!("flag"));
    out.push(("merges and delete", w.build()));

    let mut w = PatchWriter::new();
    w.move_path(&path!("user", "meta"), &path!("archive", "meta"));
    out.push(("cross-path move", w.build()));

    let mut w = PatchWriter::new();
    w.command(path!("items"), MutationCommand::move_item(2, 0));
    w.command(path!("user"), MutationCommand::move_item("name", "title"));
    out.push(("moves within containers", w.build()));

    let mut w = PatchWriter::new();
    w.link(path!("a"), LinkSpec::new("peer").to(json!(["b", "c"])).bidirectional());
    out.push(("bidirectional link", w.build()));

    out.push(("root replace", MutationPatch::set(json!({"only": true}))));

    let mut w = PatchWriter::new();
    w.set(path!("user"), json!({"name": "eve"}));
    w.set(path!("user", "tags"), json!([]));
    out.push(("parent and child in one patch", w.build()));

    out
}

#[test]
fn test_round_trip_restores_original() {
    for (label, patch) in patches() {
        let store = DocumentStore::new(base_state()).unwrap();
        let record = store.commit(patch, CommitOptions::new()).unwrap();
        assert!(!record.changes.is_empty(), "{label}: expected changes");

        let inverse = record.inverse_patch.clone().unwrap();
        store.commit(inverse, CommitOptions::new()).unwrap();
        assert!(
            deep_equal(&store.state(), &base_state()),
            "{label}: round-trip produced {}",
            store.state()
        );
    }
}

#[test]
fn test_idempotent_patch_is_invisible() {
    let store = DocumentStore::new(base_state()).unwrap();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let _watch = store
        .watch_query(
            Query::from_json(json!({"user": true})),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions::new().fire_immediately(false),
        )
        .unwrap();

    let mut w = PatchWriter::new();
    w.set(path!("user", "name"), json!("ada"));
    w.merge(path!("user", "meta"), json!({"age": 36}));
    w.set(path!("count"), json!(0.0));
    let record = store.commit(w.build(), CommitOptions::new()).unwrap();

    assert!(record.changes.is_empty());
    assert!(record.changed_paths.is_empty());
    assert!(record.inverse_patch.is_none());
    assert!(!store.can_undo(None));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[test]
fn test_dependency_soundness() {
    let store = DocumentStore::new(base_state()).unwrap();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let handle = store
        .watch_query(
            Query::from_json(json!({"user": {"meta": true}})),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions::new().fire_immediately(false),
        )
        .unwrap();
    let deps = handle.dependencies();
    assert!(deps.contains(&path!("user")));
    assert!(deps.contains(&path!("user", "meta")));

    // Disjoint paths never re-run the watcher.
    store.commit(json!({"count": 1}), CommitOptions::new()).unwrap();
    store.commit(json!({"items": {"0": {"id": 7}}}), CommitOptions::new()).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    // At or beneath a dependency always does.
    store
        .commit(json!({"user": {"meta": {"age": 40}}}), CommitOptions::new())
        .unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // A sibling under a tracked ancestor still re-runs: `user` itself was read.
    store
        .commit(json!({"user": {"name": "x"}}), CommitOptions::new())
        .unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    // Replacing an ancestor re-runs.
    store
        .commit(MutationPatch::set(json!({"count": 9})), CommitOptions::new())
        .unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

#[test]
fn test_history_ordering() {
    let store = DocumentStore::new(base_state()).unwrap();
    let mut states = vec![(*store.state()).clone()];
    for (i, (_, patch)) in patches().into_iter().enumerate() {
        store
            .commit(patch, CommitOptions::new())
            .unwrap_or_else(|e| panic!("commit {i} failed: {e}"));
        states.push((*store.state()).clone());
    }
    let n = states.len() - 1;
    let history_len = store.history(None).undo_stack.len();
    assert_eq!(history_len, n);

    for _ in 0..n {
        assert!(store.undo(None, None).unwrap().is_some());
        assert_eq!(store.history(None).undo_stack.len() + store.history(None).redo_stack.len(), n);
    }
    assert!(deep_equal(&store.state(), &states[0]));
    assert!(store.undo(None, None).unwrap().is_none());

    for _ in 0..n {
        assert!(store.redo(None, None).unwrap().is_some());
    }
    assert!(deep_equal(&store.state(), &states[n]));
    assert_eq!(store.history(None).undo_stack.len(), n);
    assert!(store.history(None).redo_stack.is_empty());
}
