//! Convenience re-exports for common use.

pub use crate::agent::{AgentConfiguration, AgentRuntime, AgentState, ConfigurationResolver};
pub use crate::agent_loop::{
    AgentEvent, AgentEventSink, ApprovalVerdict, Interruption, PendingApproval, TurnResult,
    TurnStatus,
};
pub use crate::config::{AgentSettings, McpServerSettings, ProviderSettings};
pub use crate::error::{Result, TollgateError};
pub use crate::provider::{
    ModelProvider, ProviderConfig, ProviderFactory, ProviderRegistry, ProviderRequest,
};
pub use crate::secrets::{InMemorySecretsStore, SecretsStore};
pub use crate::tools::{AgentTool, AgentToolParameters, Tool, ToolArguments, ToolRegistry};
pub use crate::types::{
    AgentToolCall, GenerationSettings, ModelMessage, Role, StreamEventType, TextStreamDelta,
    TokenUsage,
};
