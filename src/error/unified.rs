//! Error classification and recovery.

use serde::{Deserialize, Serialize};
use strum::Display;

/// Broad error category carried on `error` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    Configuration,
    TurnLimit,
    Stream,
    ToolExecution,
    Cancelled,
    ExternalServer,
    Serialization,
    Unknown,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Fix provider, model, or credential settings.
    CheckConfiguration,
    /// Resubmit the turn or raise `max_turns`.
    RaiseTurnLimit,
    Resubmit,
    CheckToolImplementation,
    CheckExternalServer,
    ContactSupport,
    None,
}
