//! Token usage accumulation for a session.

use std::sync::{Arc, RwLock};

use crate::types::TokenUsage;

/// Shared accumulator of token usage across turns.
#[derive(Clone, Default)]
pub struct UsageTracker {
    inner: Arc<RwLock<UsageTrackerInner>>,
}

#[derive(Default)]
struct UsageTrackerInner {
    total: TokenUsage,
    report_count: u64,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one completion report and return the new running total.
    pub fn record(&self, usage: &TokenUsage) -> TokenUsage {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.total.merge(usage);
        inner.report_count += 1;
        inner.total
    }

    pub fn total(&self) -> TokenUsage {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).total
    }

    /// Number of completion reports recorded since the last reset.
    pub fn report_count(&self) -> u64 {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .report_count
    }

    pub fn reset(&self) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *inner = UsageTrackerInner::default();
    }
}

impl std::fmt::Debug for UsageTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageTracker")
            .field("total", &self.total())
            .finish()
    }
}
