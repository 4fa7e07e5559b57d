//! Runtime-discovered tools (e.g. from a remote tool server).

use std::sync::Arc;

use async_trait::async_trait;

use super::arguments::ToolArguments;
use super::tool::{Tool, ToolExecutionContext};
use super::types::AgentToolParameters;
use crate::error::Result;

/// A tool discovered at runtime.
#[derive(Debug, Clone)]
pub struct DynamicTool {
    pub name: String,
    pub description: String,
    pub parameters: AgentToolParameters,
    pub requires_approval: bool,
}

/// Source of tools that are listed and executed by name at runtime.
#[async_trait]
pub trait DynamicToolProvider: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<DynamicTool>>;

    async fn execute_tool(
        &self,
        name: &str,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value>;
}

/// Exposes a [`DynamicTool`] through the core [`Tool`] trait.
pub struct DynamicToolAdapter {
    provider: Arc<dyn DynamicToolProvider>,
    tool: DynamicTool,
}

impl DynamicToolAdapter {
    pub fn new(provider: Arc<dyn DynamicToolProvider>, tool: DynamicTool) -> Self {
        Self { provider, tool }
    }

    /// List every tool of `provider` as adapters.
    pub async fn discover(provider: Arc<dyn DynamicToolProvider>) -> Result<Vec<Arc<dyn Tool>>> {
        let tools = provider.list_tools().await?;
        Ok(tools
            .into_iter()
            .map(|tool| Arc::new(Self::new(provider.clone(), tool)) as Arc<dyn Tool>)
            .collect())
    }
}

#[async_trait]
impl Tool for DynamicToolAdapter {
    fn name(&self) -> &str {
        &self.tool.name
    }

    fn description(&self) -> &str {
        &self.tool.description
    }

    fn parameters(&self) -> &AgentToolParameters {
        &self.tool.parameters
    }

    fn requires_approval(&self, _args: &ToolArguments) -> bool {
        self.tool.requires_approval
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value> {
        self.provider.execute_tool(&self.tool.name, args, ctx).await
    }
}
