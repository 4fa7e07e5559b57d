use crate::agent_loop::items::{StreamItem, ToolOutputStatus};
use crate::tools::{ToolArguments, ToolExecutionContext, ToolRegistry};
use crate::types::{AgentToolCall, AgentToolResult};

/// Output given to the model for a call the user rejected.
pub(crate) const REJECTED_OUTPUT: &str = "Tool execution was not approved.";

pub(super) fn rejected_tool_result(call: &AgentToolCall) -> AgentToolResult {
    AgentToolResult {
        tool_call_id: call.id.clone(),
        result: serde_json::Value::String(REJECTED_OUTPUT.to_string()),
        is_error: false,
    }
}

#[derive(Debug, Clone)]
pub(super) struct ToolExecutionOutcome {
    pub(super) call: AgentToolCall,
    pub(super) result: AgentToolResult,
}

impl ToolExecutionOutcome {
    pub(super) fn item(&self) -> StreamItem {
        StreamItem::ToolOutput {
            call_id: self.call.id.clone(),
            tool_name: self.call.name.clone(),
            output: self.result.result.clone(),
            status: if self.result.is_error {
                ToolOutputStatus::Incomplete
            } else {
                ToolOutputStatus::Completed
            },
        }
    }
}

pub(super) async fn execute_tool_call(
    tools: &ToolRegistry,
    call: &AgentToolCall,
) -> ToolExecutionOutcome {
    let Some(tool) = tools.get(&call.name) else {
        tracing::debug!(tool = %call.name, "model called an unknown tool");
        return ToolExecutionOutcome {
            result: AgentToolResult {
                tool_call_id: call.id.clone(),
                result: serde_json::json!({ "error": format!("Tool '{}' not found", call.name) }),
                is_error: true,
            },
            call: call.clone(),
        };
    };

    let args = ToolArguments::new(call.arguments.clone());
    let ctx = ToolExecutionContext {
        call_id: call.id.clone(),
    };
    let result = match tool.execute(&args, &ctx).await {
        Ok(value) => AgentToolResult {
            tool_call_id: call.id.clone(),
            result: value,
            is_error: false,
        },
        Err(error) => {
            tracing::debug!(tool = %call.name, %error, "tool execution failed");
            AgentToolResult {
                tool_call_id: call.id.clone(),
                result: serde_json::json!({ "error": error.to_string() }),
                is_error: true,
            }
        }
    };
    ToolExecutionOutcome {
        call: call.clone(),
        result,
    }
}
