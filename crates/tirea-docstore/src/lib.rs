//! Path-addressed document store with invertible patches.
//!
//! `tirea-docstore` keeps one JSON document (the root is always an object)
//! and changes it only through patches. Every applied patch becomes an
//! immutable [`CommitRecord`] carrying its change list, a diff and an inverse
//! patch, which feed per-channel undo/redo and the re-evaluation of live
//! queries.
//!
//! # Core Concepts
//!
//! - **Path**: key/index address into the document, see [`path!`]
//! - **MutationPatch**: a tree of operator commands (`$op`) and implicit sets
//! - **DocumentStore**: applies patches transactionally and records commits
//! - **Query**: declarative `$`-directive specs or resolver functions, with
//!   read dependencies captured for invalidation
//! - **Intent**: a named producer turning a payload into a patch
//!
//! # Quick Start
//!
//! ```
//! use tirea_docstore::{path, CommitOptions, DocumentStore, PatchWriter};
//! use serde_json::json;
//!
//! let store = DocumentStore::new(json!({"count": 0})).unwrap();
//!
//! let mut w = PatchWriter::new();
//! w.set(path!("count"), json!(1));
//! w.set(path!("labels", "title"), json!("Counter"));
//!
//! let record = store.commit(w.build(), CommitOptions::new()).unwrap();
//! assert_eq!(record.diff.added_paths, vec![path!("labels")]);
//! assert_eq!(store.state()["labels"]["title"], "Counter");
//!
//! store.undo(None, None).unwrap();
//! assert_eq!(*store.state(), json!({"count": 0}));
//! ```
//!
//! # Live queries
//!
//! ```
//! use tirea_docstore::{query::Query, CommitOptions, DocumentStore, WatchOptions};
//! use serde_json::json;
//! use std::sync::{Arc, Mutex};
//!
//! let store = DocumentStore::new(json!({"todos": [{"done": false}]})).unwrap();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//! let handle = store
//!     .watch_query(
//!         Query::from_json(json!({"todos": {"$where": {"done": true}}})),
//!         move |result| sink.lock().unwrap().push((**result).clone()),
//!         WatchOptions::new(),
//!     )
//!     .unwrap();
//!
//! store.commit(json!({"todos": {"0": {"done": true}}}), CommitOptions::new()).unwrap();
//! assert_eq!(seen.lock().unwrap().len(), 2);
//! handle.unsubscribe();
//! ```

pub mod access;
mod change;
mod command;
pub mod commit;
mod config;
mod error;
mod executor;
pub mod history;
pub mod intent;
pub mod inverse;
pub mod mutation;
mod patch;
mod path;
pub mod query;
pub mod reactive;
mod registry;
pub mod snapshot;
mod store;
pub mod value;
mod writer;

pub use change::{CommitDiff, MutationChange};
pub use command::{LinkSpec, MutationCommand, COMMAND_TAG};
pub use commit::{
    CommitEvent, CommitOptions, CommitRecord, CommitSource, EventProducer, EventSpec, GraphEvent,
    HistoryMode, IntentRef,
};
pub use config::{EventMode, StoreConfig};
pub use error::{value_type_name, StoreError, StoreResult};
pub use history::{HistoryChannelState, HistoryEntry};
pub use intent::{DispatchOptions, IntentContext, IntentOutput, IntentProducer};
pub use mutation::{MutationContext, MutationHandler};
pub use patch::MutationPatch;
pub use path::{Path, Seg};
pub use reactive::{
    Equality, InvalidationEvent, QueryRunEvent, QueryRunReason, WatchHandle, WatchOptions,
};
pub use registry::Subscription;
pub use snapshot::{PersistedSnapshot, SnapshotStrategy, SNAPSHOT_VERSION};
pub use store::{DocumentStore, HistoryTarget};
pub use value::{deep_equal, ValueSnapshot};
pub use writer::PatchWriter;
