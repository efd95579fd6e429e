//! # History channels
//!
//! Independent undo/redo lanes built from commit records.
//!
//! ## Design
//!
//! - Each recorded commit stores its forward and inverse patch
//! - Undo replays the inverse and moves the entry to the redo stack
//! - Redo replays the forward patch and moves it back
//! - A new commit clears the redo stack of its channel
//! - Both stacks keep at most `max_commits` entries, dropping the oldest
//!
//! Undo/redo are split into `peek_*` and `complete_*` so the store can
//! commit the replayed patch without holding the history lock.

use crate::MutationPatch;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One undoable step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub commit_id: String,
    pub forward_patch: MutationPatch,
    pub inverse_patch: MutationPatch,
}

/// The two stacks of one channel (most recent last).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryChannelState {
    pub undo_stack: Vec<HistoryEntry>,
    pub redo_stack: Vec<HistoryEntry>,
}

impl HistoryChannelState {
    fn truncate(&mut self, max: usize) {
        truncate_front(&mut self.undo_stack, max);
        truncate_front(&mut self.redo_stack, max);
    }
}

fn truncate_front(stack: &mut Vec<HistoryEntry>, max: usize) {
    if stack.len() > max {
        stack.drain(..stack.len() - max);
    }
}

/// All channels of a store, created lazily.
#[derive(Debug)]
pub(crate) struct HistoryChannels {
    channels: HashMap<String, HistoryChannelState>,
    max_commits: usize,
    default_channel: String,
}

impl HistoryChannels {
    pub(crate) fn new(max_commits: usize, default_channel: impl Into<String>) -> Self {
        Self {
            channels: HashMap::new(),
            max_commits,
            default_channel: default_channel.into(),
        }
    }

    /// Blank or missing names map to the default channel.
    pub(crate) fn normalize(&self, channel: Option<&str>) -> String {
        match channel.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.default_channel.clone(),
        }
    }

    /// Push a new step and clear the channel's redo stack.
    pub(crate) fn record(&mut self, channel: &str, entry: HistoryEntry) {
        let max = self.max_commits;
        let state = self.channels.entry(channel.to_string()).or_default();
        state.undo_stack.push(entry);
        state.redo_stack.clear();
        state.truncate(max);
    }

    /// The step an undo would replay. With `target`, only if the top entry
    /// belongs to that commit.
    pub(crate) fn peek_undo(&self, channel: &str, target: Option<&str>) -> Option<HistoryEntry> {
        peek(self.channels.get(channel)?.undo_stack.last(), target)
    }

    pub(crate) fn peek_redo(&self, channel: &str, target: Option<&str>) -> Option<HistoryEntry> {
        peek(self.channels.get(channel)?.redo_stack.last(), target)
    }

    /// Move the top undo entry to the redo stack, if it is still `commit_id`.
    pub(crate) fn complete_undo(&mut self, channel: &str, commit_id: &str) -> bool {
        let max = self.max_commits;
        let Some(state) = self.channels.get_mut(channel) else {
            return false;
        };
        if !state.undo_stack.last().is_some_and(|e| e.commit_id == commit_id) {
            return false;
        }
        if let Some(entry) = state.undo_stack.pop() {
            state.redo_stack.push(entry);
        }
        state.truncate(max);
        true
    }

    /// Move the top redo entry back to the undo stack.
    pub(crate) fn complete_redo(&mut self, channel: &str, commit_id: &str) -> bool {
        let max = self.max_commits;
        let Some(state) = self.channels.get_mut(channel) else {
            return false;
        };
        if !state.redo_stack.last().is_some_and(|e| e.commit_id == commit_id) {
            return false;
        }
        if let Some(entry) = state.redo_stack.pop() {
            state.undo_stack.push(entry);
        }
        state.truncate(max);
        true
    }

    pub(crate) fn can_undo(&self, channel: &str) -> bool {
        self.channels
            .get(channel)
            .is_some_and(|s| !s.undo_stack.is_empty())
    }

    pub(crate) fn can_redo(&self, channel: &str) -> bool {
        self.channels
            .get(channel)
            .is_some_and(|s| !s.redo_stack.is_empty())
    }

    pub(crate) fn channel(&self, channel: &str) -> Option<&HistoryChannelState> {
        self.channels.get(channel)
    }
}

fn peek(top: Option<&HistoryEntry>, target: Option<&str>) -> Option<HistoryEntry> {
    let top = top?;
    match target {
        Some(id) if id != top.commit_id => None,
        _ => Some(top.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(id: &str) -> HistoryEntry {
        HistoryEntry {
            commit_id: id.to_string(),
            forward_patch: MutationPatch::from(json!({"v": id})),
            inverse_patch: MutationPatch::delete(),
        }
    }

    #[test]
    fn test_normalize_blank_channel() {
        let h = HistoryChannels::new(10, "default");
        assert_eq!(h.normalize(None), "default");
        assert_eq!(h.normalize(Some("  ")), "default");
        assert_eq!(h.normalize(Some("canvas")), "canvas");
    }

    #[test]
    fn test_undo_redo_cycle() {
        let mut h = HistoryChannels::new(10, "default");
        h.record("default", entry("a"));
        h.record("default", entry("b"));
        assert!(h.can_undo("default"));
        assert!(!h.can_redo("default"));

        let top = h.peek_undo("default", None).unwrap();
        assert_eq!(top.commit_id, "b");
        assert!(h.complete_undo("default", "b"));
        assert!(h.can_redo("default"));

        assert!(h.peek_redo("default", Some("a")).is_none());
        assert!(h.complete_redo("default", "b"));
        assert_eq!(h.channel("default").unwrap().undo_stack.len(), 2);
    }

    #[test]
    fn test_new_record_clears_redo() {
        let mut h = HistoryChannels::new(10, "default");
        h.record("default", entry("a"));
        h.complete_undo("default", "a");
        h.record("default", entry("b"));
        assert!(!h.can_redo("default"));
    }

    #[test]
    fn test_target_mismatch_and_unknown_channel() {
        let mut h = HistoryChannels::new(10, "default");
        h.record("default", entry("a"));
        assert!(h.peek_undo("default", Some("zzz")).is_none());
        assert!(h.peek_undo("x", None).is_none());
        assert!(!h.complete_undo("default", "zzz"));
        assert!(h.can_undo("default"));
    }

    #[test]
    fn test_stacks_are_bounded() {
        let mut h = HistoryChannels::new(2, "default");
        for id in ["a", "b", "c"] {
            h.record("default", entry(id));
        }
        let ids: Vec<_> = h
            .channel("default")
            .unwrap()
            .undo_stack
            .iter()
            .map(|e| e.commit_id.as_str())
            .collect();
        assert_eq!(ids, vec!["b", "c"]);
    }
}
