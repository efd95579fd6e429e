//! Store configuration.

use serde::{Deserialize, Serialize};

/// When commits emit graph events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventMode {
    /// Only when a commit asks for one (`emit_event`, an override or a producer).
    Manual,
    /// For every commit unless the commit suppresses it.
    Always,
    /// Only while at least one event listener is attached.
    #[default]
    WhenObserved,
}

/// Configuration for a [`DocumentStore`](crate::DocumentStore).
///
/// ```
/// use tirea_docstore::{EventMode, StoreConfig};
///
/// let config: StoreConfig = serde_json::from_str(r#"{"maxCommits": 10, "eventMode": "always"}"#).unwrap();
/// assert_eq!(config.max_commits, 10);
/// assert_eq!(config.event_mode, EventMode::Always);
/// assert_eq!(config.default_history_channel, "default");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    /// Bound on the commit log and on each history stack.
    pub max_commits: usize,
    pub event_mode: EventMode,
    /// Channel used when a commit or undo names none.
    pub default_history_channel: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_commits: 100,
            event_mode: EventMode::default(),
            default_history_channel: "default".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn with_max_commits(mut self, max_commits: usize) -> Self {
        self.max_commits = max_commits;
        self
    }

    pub fn with_event_mode(mut self, mode: EventMode) -> Self {
        self.event_mode = mode;
        self
    }

    pub fn with_default_history_channel(mut self, channel: impl Into<String>) -> Self {
        self.default_history_channel = channel.into();
        self
    }
}
