//! Persistence for `tirea-docstore`.
//!
//! - [`SnapshotStore`]: where serialized snapshots live ([`MemorySnapshotStore`],
//!   [`FileSnapshotStore`])
//! - [`PersistenceAdapter`]: binds a [`DocumentStore`](tirea_docstore::DocumentStore)
//!   to a snapshot store, saving on a debounce after commits and restoring
//!   through `materialize_external_patch`

mod error;
mod file_store;
mod memory_store;
mod persistence;

pub use error::PersistError;
pub use file_store::FileSnapshotStore;
pub use memory_store::MemorySnapshotStore;
pub use persistence::{ErrorCallback, PersistenceAdapter, PersistenceOptions};

use async_trait::async_trait;

/// Storage for one serialized snapshot.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// The stored snapshot text, or `None` when nothing was saved.
    async fn load(&self) -> Result<Option<String>, PersistError>;

    /// Replace the stored snapshot.
    async fn save(&self, content: &str) -> Result<(), PersistError>;

    /// Remove the stored snapshot. Clearing an empty store is not an error.
    async fn clear(&self) -> Result<(), PersistError>;
}
