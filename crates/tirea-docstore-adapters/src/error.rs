use thiserror::Error;

/// Errors raised by snapshot stores and the persistence adapter.
#[derive(Debug, Error)]
pub enum PersistError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Snapshot key unusable as a file name.
    #[error("Invalid snapshot key: {0}")]
    InvalidKey(String),

    /// Scheduling needs a tokio runtime.
    #[error("No tokio runtime: {0}")]
    Runtime(String),
}
