use crate::{PersistError, SnapshotStore};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory snapshot storage for testing and local development.
#[derive(Default)]
pub struct MemorySnapshotStore {
    content: tokio::sync::RwLock<Option<String>>,
    saves: AtomicUsize,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `content` already stored.
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            content: tokio::sync::RwLock::new(Some(content.into())),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self) -> Result<Option<String>, PersistError> {
        Ok(self.content.read().await.clone())
    }

    async fn save(&self, content: &str) -> Result<(), PersistError> {
        *self.content.write().await = Some(content.to_string());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> Result<(), PersistError> {
        self.content.write().await.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_save_load_clear() {
        let store = MemorySnapshotStore::new();
        assert!(store.load().await.unwrap().is_none());

        store.save("{\"a\":1}").await.unwrap();
        store.save("{\"a\":2}").await.unwrap();
        assert_eq!(store.load().await.unwrap().as_deref(), Some("{\"a\":2}"));
        assert_eq!(store.save_count(), 2);

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn memory_store_with_content() {
        let store = MemorySnapshotStore::with_content("x");
        assert_eq!(store.load().await.unwrap().as_deref(), Some("x"));
        assert_eq!(store.save_count(), 0);
    }
}
