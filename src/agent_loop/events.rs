//! Observer-facing event vocabulary.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCategory, TollgateError};

/// One entry of a grouped approval request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalItem {
    pub interruption_id: String,
    pub tool_name: String,
    pub input: String,
}

/// Events delivered to the agent's observer. Serialized as
/// `{"type": "<snake_case name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AgentEvent {
    MessageStart {
        message_id: String,
    },
    /// `content` is the concatenation of every chunk of this message so far.
    MessageChunk {
        message_id: String,
        chunk: String,
        content: String,
    },
    MessageComplete {
        message_id: String,
        content: String,
    },
    ToolCallStart {
        call_id: String,
        tool_name: String,
        input: String,
    },
    ToolCallComplete {
        call_id: String,
        tool_name: String,
        output: String,
        is_error: bool,
    },
    ToolApprovalRequired {
        interruption_id: String,
        tool_name: String,
        input: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
    },
    GroupedApprovalRequired {
        group_id: String,
        approvals: Vec<ApprovalItem>,
    },
    /// Running session totals after a model response reported usage.
    TokenUsageChanged {
        input_tokens: u64,
        output_tokens: u64,
    },
    Error {
        message: String,
        category: ErrorCategory,
    },
}

impl AgentEvent {
    pub fn error(error: &TollgateError) -> Self {
        AgentEvent::Error {
            message: error.to_string(),
            category: error.category(),
        }
    }
}

/// Callback receiving agent events.
pub type AgentEventSink = Arc<dyn Fn(AgentEvent) + Send + Sync>;

/// Cheap, cloneable handle that forwards events to an optional sink.
#[derive(Clone, Default)]
pub struct AgentEventEmitter {
    sink: Option<AgentEventSink>,
}

impl AgentEventEmitter {
    pub fn new(sink: Option<AgentEventSink>) -> Self {
        Self { sink }
    }

    pub fn emit(&self, event: AgentEvent) {
        if let Some(sink) = &self.sink {
            (sink)(event);
        }
    }
}

impl std::fmt::Debug for AgentEventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentEventEmitter")
            .field("sink", &self.sink.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Render tool input for display: pretty JSON when parseable, else the raw text.
pub fn pretty_input(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(raw) => match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(parsed) if parsed.is_object() || parsed.is_array() => {
                serde_json::to_string_pretty(&parsed).unwrap_or_else(|_| raw.clone())
            }
            _ => raw.clone(),
        },
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}
