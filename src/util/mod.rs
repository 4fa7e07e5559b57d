//! Shared utilities.

pub mod usage;

pub use usage::UsageTracker;
