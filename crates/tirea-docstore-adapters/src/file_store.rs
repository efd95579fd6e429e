use crate::{PersistError, SnapshotStore};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

/// File-based snapshot storage. One snapshot per key, stored as `<key>.json`.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    base_path: PathBuf,
    key: String,
}

impl FileSnapshotStore {
    /// Store the snapshot for `key` under `base_path`.
    pub fn new(base_path: impl Into<PathBuf>, key: impl Into<String>) -> Result<Self, PersistError> {
        let key = key.into();
        validate_key(&key)?;
        Ok(Self {
            base_path: base_path.into(),
            key,
        })
    }

    /// Location of the snapshot file.
    pub fn path(&self) -> PathBuf {
        self.base_path.join(format!("{}.json", self.key))
    }

    async fn write_atomic(&self, content: &str) -> Result<(), PersistError> {
        if !self.base_path.exists() {
            tokio::fs::create_dir_all(&self.base_path).await?;
        }

        let target = self.path();
        let tmp_path = self.base_path.join(format!(
            ".{}.{}.tmp",
            self.key,
            uuid::Uuid::new_v4().simple()
        ));

        let write_result = async {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            file.write_all(content.as_bytes()).await?;
            file.flush().await?;
            file.sync_all().await?;
            drop(file);

            match tokio::fs::rename(&tmp_path, &target).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    tokio::fs::remove_file(&target).await?;
                    tokio::fs::rename(&tmp_path, &target).await?;
                }
                Err(e) => return Err(e),
            }
            Ok::<(), std::io::Error>(())
        }
        .await;

        if let Err(e) = write_result {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(PersistError::Io(e));
        }
        Ok(())
    }
}

fn validate_key(key: &str) -> Result<(), PersistError> {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return Err(PersistError::InvalidKey("key cannot be empty".to_string()));
    }
    if trimmed != key {
        return Err(PersistError::InvalidKey(
            "key cannot have leading or trailing whitespace".to_string(),
        ));
    }
    if key.contains('/')
        || key.contains('\\')
        || key.contains("..")
        || key.contains('\0')
        || key.chars().any(|c| c.is_control())
    {
        return Err(PersistError::InvalidKey(format!(
            "key contains invalid characters: {key:?}"
        )));
    }
    Ok(())
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn load(&self) -> Result<Option<String>, PersistError> {
        match tokio::fs::read_to_string(self.path()).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, content: &str) -> Result<(), PersistError> {
        self.write_atomic(content).await
    }

    async fn clear(&self) -> Result<(), PersistError> {
        match tokio::fs::remove_file(self.path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
