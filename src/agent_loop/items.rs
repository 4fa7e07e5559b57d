//! Low-level items produced by a run, before translation into agent events.

use serde::{Deserialize, Serialize};

use crate::types::{AgentToolCall, TokenUsage};

/// Completion status reported by the tool-execution layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutputStatus {
    Completed,
    /// The tool failed or could not run; the output describes why.
    Incomplete,
}

/// One item of a run's streamed output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamItem {
    ResponseStarted,
    OutputTextDelta {
        delta: String,
    },
    /// The assistant text of the current response is final.
    MessageOutput {
        content: String,
    },
    ToolCalled {
        call: AgentToolCall,
    },
    ToolOutput {
        call_id: String,
        tool_name: String,
        output: serde_json::Value,
        status: ToolOutputStatus,
    },
    ResponseCompleted {
        usage: TokenUsage,
    },
    /// Any item kind this version does not know.
    #[serde(other)]
    Unknown,
}
