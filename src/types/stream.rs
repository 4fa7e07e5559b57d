//! Streaming deltas produced by model providers.

use serde::{Deserialize, Serialize};

use super::message::AgentToolCall;
use super::usage::TokenUsage;

/// A delta emitted during streaming.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextStreamDelta {
    /// The incremental text chunk (or the error message for `Error`).
    pub text: String,
    /// Event type.
    pub event_type: StreamEventType,
    /// Tool call being built (only on `ToolCallDelta`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<AgentToolCall>,
    /// Usage (typically only on the final delta).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl TextStreamDelta {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            event_type: StreamEventType::TextDelta,
            tool_call: None,
            usage: None,
        }
    }

    /// A complete or partial tool call. Repeated deltas with the same id
    /// replace the earlier snapshot.
    pub fn tool_call(call: AgentToolCall) -> Self {
        Self {
            text: String::new(),
            event_type: StreamEventType::ToolCallDelta,
            tool_call: Some(call),
            usage: None,
        }
    }

    pub fn done(usage: Option<TokenUsage>) -> Self {
        Self {
            text: String::new(),
            event_type: StreamEventType::Done,
            tool_call: None,
            usage,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            text: message.into(),
            event_type: StreamEventType::Error,
            tool_call: None,
            usage: None,
        }
    }
}

/// Type of stream event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventType {
    /// Stream started.
    Start,
    /// Incremental text content.
    TextDelta,
    /// Tool call being built.
    ToolCallDelta,
    /// Stream finished.
    Done,
    /// Error during stream.
    Error,
}
