//! Commit records, commit options and graph events.

use crate::{
    config::EventMode, CommitDiff, MutationChange, MutationPatch, Path,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Where a commit came from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CommitSource {
    /// A direct `commit` call.
    #[default]
    Patch,
    /// Data materialized from outside (persistence, connectors).
    External,
    /// A dispatched intent.
    Intent,
    /// An undo replaying an inverse patch.
    Undo,
    /// A redo replaying a forward patch.
    Redo,
    /// Caller-defined label.
    Custom(String),
}

impl CommitSource {
    pub fn as_str(&self) -> &str {
        match self {
            CommitSource::Patch => "patch",
            CommitSource::External => "external",
            CommitSource::Intent => "intent",
            CommitSource::Undo => "undo",
            CommitSource::Redo => "redo",
            CommitSource::Custom(label) => label,
        }
    }

    /// Undo and redo commits never enter history themselves.
    #[inline]
    pub fn is_history_replay(&self) -> bool {
        matches!(self, CommitSource::Undo | CommitSource::Redo)
    }
}

impl From<String> for CommitSource {
    fn from(s: String) -> Self {
        match s.as_str() {
            "patch" => CommitSource::Patch,
            "external" => CommitSource::External,
            "intent" => CommitSource::Intent,
            "undo" => CommitSource::Undo,
            "redo" => CommitSource::Redo,
            _ => CommitSource::Custom(s),
        }
    }
}

impl From<&str> for CommitSource {
    fn from(s: &str) -> Self {
        CommitSource::from(s.to_string())
    }
}

impl From<CommitSource> for String {
    fn from(source: CommitSource) -> Self {
        source.as_str().to_string()
    }
}

impl fmt::Display for CommitSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The intent a commit was produced by.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentRef {
    pub name: String,
    #[serde(default)]
    pub payload: Value,
}

/// An immutable record of one applied patch.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRecord {
    /// Unique id (UUID v7, simple form).
    pub id: String,
    /// Strictly increasing per store, never reused.
    pub index: u64,
    /// Unix epoch milliseconds.
    pub at: u64,
    pub source: CommitSource,
    /// The patch as committed.
    pub patch: MutationPatch,
    /// Restores the pre-commit state; `None` when nothing changed.
    pub inverse_patch: Option<MutationPatch>,
    pub diff: CommitDiff,
    pub changes: Vec<MutationChange>,
    /// Paths of `changes`, in order.
    pub changed_paths: Vec<Path>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<IntentRef>,
    /// The history lane this commit was recorded on, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<GraphEvent>,
    /// The full post-commit state.
    pub state: Arc<Value>,
}

/// Event emitted to `on_event` listeners after a commit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEvent {
    pub id: String,
    /// The intent name for intent commits, `"commit"` otherwise, unless
    /// overridden.
    pub kind: String,
    pub commit_id: String,
    pub index: u64,
    pub source: CommitSource,
    pub at: u64,
    pub changed_paths: Vec<Path>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<IntentRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// The intent payload for intent commits, the patch otherwise, unless
    /// overridden.
    pub payload: Value,
}

/// Caller-supplied event fields.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl EventSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<Value>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Fields set on `over` win.
    pub(crate) fn overlay(self, over: EventSpec) -> EventSpec {
        EventSpec {
            kind: over.kind.or(self.kind),
            payload: over.payload.or(self.payload),
        }
    }
}

/// Builds event fields from the finished record; `None` vetoes the event.
pub type EventProducer = Arc<dyn Fn(&CommitRecord) -> Option<EventSpec> + Send + Sync>;

/// Per-commit event control.
#[derive(Clone)]
pub enum CommitEvent {
    /// Never emit for this commit.
    Disabled,
    /// Emit with these fields.
    Override(EventSpec),
    /// Emit whatever the producer returns.
    Producer(EventProducer),
}

impl fmt::Debug for CommitEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitEvent::Disabled => f.write_str("Disabled"),
            CommitEvent::Override(spec) => f.debug_tuple("Override").field(spec).finish(),
            CommitEvent::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

impl From<EventSpec> for CommitEvent {
    fn from(spec: EventSpec) -> Self {
        CommitEvent::Override(spec)
    }
}

/// Which history lane a commit goes to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum HistoryMode {
    /// The store's default channel.
    #[default]
    Record,
    /// A named channel.
    Channel(String),
    /// Keep the commit out of history.
    Skip,
}

/// Options for [`DocumentStore::commit`](crate::DocumentStore::commit).
///
/// ```
/// use tirea_docstore::{CommitOptions, CommitSource};
/// use serde_json::json;
///
/// let opts = CommitOptions::new()
///     .source(CommitSource::External)
///     .metadata(json!({"origin": "sync"}))
///     .history_channel("canvas")
///     .emit_event(false);
/// assert_eq!(opts.emit_event, Some(false));
/// ```
#[derive(Clone, Debug, Default)]
pub struct CommitOptions {
    pub source: Option<CommitSource>,
    pub metadata: Option<Value>,
    pub intent: Option<IntentRef>,
    pub history: HistoryMode,
    /// Explicit emit decision; overrides the store's event mode.
    pub emit_event: Option<bool>,
    pub event: Option<CommitEvent>,
}

impl CommitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(mut self, source: impl Into<CommitSource>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn metadata(mut self, metadata: impl Into<Value>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    pub fn intent(mut self, name: impl Into<String>, payload: impl Into<Value>) -> Self {
        self.intent = Some(IntentRef {
            name: name.into(),
            payload: payload.into(),
        });
        self
    }

    pub fn history_channel(mut self, channel: impl Into<String>) -> Self {
        self.history = HistoryMode::Channel(channel.into());
        self
    }

    pub fn skip_history(mut self) -> Self {
        self.history = HistoryMode::Skip;
        self
    }

    pub fn emit_event(mut self, emit: bool) -> Self {
        self.emit_event = Some(emit);
        self
    }

    pub fn event(mut self, event: impl Into<CommitEvent>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn event_producer(
        mut self,
        producer: impl Fn(&CommitRecord) -> Option<EventSpec> + Send + Sync + 'static,
    ) -> Self {
        self.event = Some(CommitEvent::Producer(Arc::new(producer)));
        self
    }

    pub fn no_event(mut self) -> Self {
        self.event = Some(CommitEvent::Disabled);
        self
    }

    /// Whether an event should be built for this commit.
    pub(crate) fn wants_event(&self, mode: EventMode, observed: bool) -> bool {
        if matches!(self.event, Some(CommitEvent::Disabled)) {
            return false;
        }
        if let Some(explicit) = self.emit_event {
            return explicit;
        }
        if self.event.is_some() {
            return true;
        }
        match mode {
            EventMode::Always => true,
            EventMode::WhenObserved => observed,
            EventMode::Manual => false,
        }
    }
}

/// Build the event for a finished record. `None` when a producer vetoes it.
pub(crate) fn build_event(
    record: &CommitRecord,
    event: Option<&CommitEvent>,
    id: String,
) -> Option<GraphEvent> {
    let spec = match event {
        Some(CommitEvent::Producer(producer)) => producer(record)?,
        Some(CommitEvent::Override(spec)) => spec.clone(),
        Some(CommitEvent::Disabled) => return None,
        None => EventSpec::default(),
    };
    let default_kind = record
        .intent
        .as_ref()
        .map(|intent| intent.name.clone())
        .unwrap_or_else(|| "commit".to_string());
    let default_payload = match &record.intent {
        Some(intent) => intent.payload.clone(),
        None => record.patch.to_json(),
    };
    Some(GraphEvent {
        id,
        kind: spec.kind.unwrap_or(default_kind),
        commit_id: record.id.clone(),
        index: record.index,
        source: record.source.clone(),
        at: record.at,
        changed_paths: record.changed_paths.clone(),
        intent: record.intent.clone(),
        metadata: record.metadata.clone(),
        payload: spec.payload.unwrap_or(default_payload),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> CommitRecord {
        CommitRecord {
            id: "c1".into(),
            index: 1,
            at: 0,
            source: CommitSource::Intent,
            patch: MutationPatch::from(json!({"a": 1})),
            inverse_patch: None,
            diff: CommitDiff::default(),
            changes: Vec::new(),
            changed_paths: Vec::new(),
            metadata: None,
            intent: Some(IntentRef {
                name: "todo/add".into(),
                payload: json!({"title": "x"}),
            }),
            history_channel: None,
            event: None,
            state: Arc::new(json!({})),
        }
    }

    #[test]
    fn test_source_string_encoding() {
        assert_eq!(serde_json::to_value(CommitSource::Undo).unwrap(), json!("undo"));
        let custom: CommitSource = serde_json::from_value(json!("sync")).unwrap();
        assert_eq!(custom, CommitSource::Custom("sync".into()));
        assert!(CommitSource::Redo.is_history_replay());
        assert!(!custom.is_history_replay());
    }

    #[test]
    fn test_event_resolution() {
        let plain = CommitOptions::new();
        assert!(!plain.wants_event(EventMode::Manual, true));
        assert!(plain.wants_event(EventMode::Always, false));
        assert!(plain.wants_event(EventMode::WhenObserved, true));
        assert!(!plain.wants_event(EventMode::WhenObserved, false));

        let forced = CommitOptions::new().emit_event(true);
        assert!(forced.wants_event(EventMode::Manual, false));

        let overridden = CommitOptions::new().event(EventSpec::new("custom"));
        assert!(overridden.wants_event(EventMode::Manual, false));

        let silenced = CommitOptions::new().emit_event(true).no_event();
        assert!(!silenced.wants_event(EventMode::Always, true));
    }

    #[test]
    fn test_build_event_defaults_to_intent() {
        let event = build_event(&record(), None, "e1".into()).unwrap();
        assert_eq!(event.kind, "todo/add");
        assert_eq!(event.payload, json!({"title": "x"}));
        assert_eq!(event.commit_id, "c1");
    }

    #[test]
    fn test_producer_can_veto() {
        let veto: CommitEvent = CommitEvent::Producer(Arc::new(|_: &CommitRecord| -> Option<EventSpec> { None }));
        assert!(build_event(&record(), Some(&veto), "e1".into()).is_none());

        let rename = CommitEvent::Producer(Arc::new(|r: &CommitRecord| {
            Some(EventSpec::new(format!("seen-{}", r.index)))
        }));
        let event = build_event(&record(), Some(&rename), "e1".into()).unwrap();
        assert_eq!(event.kind, "seen-1");
    }
}
