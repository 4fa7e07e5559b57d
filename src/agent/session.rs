//! Session state: the ordered conversation history and its token totals.

use crate::types::{ModelMessage, TokenUsage};
use crate::util::UsageTracker;

/// Conversation history threaded through every run, plus token accounting.
#[derive(Debug, Default)]
pub struct Session {
    items: Vec<ModelMessage>,
    usage: UsageTracker,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ModelMessage) {
        self.items.push(message);
    }

    pub fn items(&self) -> &[ModelMessage] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Replace the history with a completed run's history, which must extend
    /// the current one.
    pub fn commit(&mut self, history: Vec<ModelMessage>) {
        debug_assert!(history.len() >= self.items.len());
        self.items = history;
    }

    /// Handle used by the event translator to accumulate usage.
    pub fn usage_tracker(&self) -> UsageTracker {
        self.usage.clone()
    }

    pub fn usage(&self) -> TokenUsage {
        self.usage.total()
    }

    /// Empty the history and zero the token counters.
    pub fn clear(&mut self) {
        self.items.clear();
        self.usage.reset();
    }
}
