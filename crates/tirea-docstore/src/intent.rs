//! Named intents: producers that turn a payload into a patch.

use crate::{
    commit::{CommitOptions, CommitSource, EventSpec, HistoryMode},
    error::StoreResult,
    query::{CapabilityScope, Query},
    DocumentStore, MutationPatch,
};
use serde_json::Value;
use std::sync::Arc;

/// What an intent producer sees: the current state and read-only queries
/// against it.
pub struct IntentContext<'a> {
    store: &'a DocumentStore,
    state: Arc<Value>,
}

impl<'a> IntentContext<'a> {
    pub(crate) fn new(store: &'a DocumentStore) -> Self {
        Self {
            state: store.state(),
            store,
        }
    }

    pub fn state(&self) -> &Value {
        &self.state
    }

    pub fn query(&self, query: &Query, scope: Option<&CapabilityScope>) -> StoreResult<Value> {
        self.store.query(query, scope)
    }
}

/// A producer's result.
#[derive(Clone, Debug, Default)]
pub struct IntentOutput {
    pub patch: MutationPatch,
    pub metadata: Option<Value>,
    pub event: Option<EventSpec>,
}

impl IntentOutput {
    pub fn new(patch: impl Into<MutationPatch>) -> Self {
        Self {
            patch: patch.into(),
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, metadata: impl Into<Value>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    pub fn with_event(mut self, event: EventSpec) -> Self {
        self.event = Some(event);
        self
    }
}

impl From<MutationPatch> for IntentOutput {
    fn from(patch: MutationPatch) -> Self {
        Self::new(patch)
    }
}

/// Maps a payload to a patch; `None` means "nothing to do".
pub type IntentProducer =
    Arc<dyn Fn(&Value, &IntentContext<'_>) -> Option<IntentOutput> + Send + Sync>;

/// Caller overrides for [`DocumentStore::dispatch_intent`].
#[derive(Clone, Debug, Default)]
pub struct DispatchOptions {
    pub source: Option<CommitSource>,
    pub metadata: Option<Value>,
    pub event: Option<EventSpec>,
    pub history: HistoryMode,
    pub emit_event: Option<bool>,
}

impl DispatchOptions {
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

    pub fn event(mut self, event: EventSpec) -> Self {
        self.event = Some(event);
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

    /// Commit options for a produced output. Caller values win.
    pub(crate) fn into_commit_options(
        self,
        name: &str,
        payload: &Value,
        output_metadata: Option<Value>,
        output_event: Option<EventSpec>,
    ) -> CommitOptions {
        let metadata = merge_metadata(output_metadata, self.metadata);
        let event = match (output_event, self.event) {
            (Some(produced), Some(caller)) => Some(produced.overlay(caller)),
            (produced, caller) => caller.or(produced),
        };
        let mut options = CommitOptions::new()
            .source(self.source.unwrap_or(CommitSource::Intent))
            .intent(name, payload.clone());
        options.metadata = metadata;
        options.history = self.history;
        options.emit_event = self.emit_event;
        if let Some(event) = event {
            options = options.event(event);
        }
        options
    }
}

/// Object metadata merges key-wise with `caller` winning; otherwise the
/// caller's value replaces the producer's.
fn merge_metadata(produced: Option<Value>, caller: Option<Value>) -> Option<Value> {
    match (produced, caller) {
        (Some(Value::Object(mut base)), Some(Value::Object(over))) => {
            base.extend(over);
            Some(Value::Object(base))
        }
        (produced, caller) => caller.or(produced),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::CommitEvent;
    use serde_json::json;

    #[test]
    fn test_metadata_merge() {
        assert_eq!(
            merge_metadata(Some(json!({"a": 1, "b": 1})), Some(json!({"b": 2}))),
            Some(json!({"a": 1, "b": 2}))
        );
        assert_eq!(merge_metadata(Some(json!({"a": 1})), Some(json!("x"))), Some(json!("x")));
        assert_eq!(merge_metadata(Some(json!(1)), None), Some(json!(1)));
        assert_eq!(merge_metadata(None, None), None);
    }

    #[test]
    fn test_commit_options_from_dispatch() {
        let opts = DispatchOptions::new()
            .metadata(json!({"by": "caller"}))
            .event(EventSpec::new("renamed"))
            .into_commit_options(
                "rename",
                &json!({"to": "x"}),
                Some(json!({"by": "producer", "undoable": true})),
                Some(EventSpec::default().with_payload(json!({"p": 1}))),
            );
        assert_eq!(opts.source, Some(CommitSource::Intent));
        assert_eq!(opts.intent.as_ref().map(|i| i.name.as_str()), Some("rename"));
        assert_eq!(opts.metadata, Some(json!({"by": "caller", "undoable": true})));
        let Some(CommitEvent::Override(spec)) = opts.event else {
            panic!("expected an override event");
        };
        assert_eq!(spec.kind.as_deref(), Some("renamed"));
        assert_eq!(spec.payload, Some(json!({"p": 1})));
    }
}
