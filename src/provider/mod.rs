//! Model provider trait and registry.

pub mod factory;
pub mod registry;

use async_trait::async_trait;
use bon::Builder;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::tools::ToolRegistry;
use crate::types::{GenerationSettings, ModelMessage, TextStreamDelta};

pub use factory::{ProviderConfig, ProviderFactory};
pub use registry::ProviderRegistry;

/// A streamed provider response.
pub type DeltaStream = BoxStream<'static, Result<TextStreamDelta>>;

/// A request sent to a model provider.
#[derive(Debug, Clone, Builder)]
pub struct ProviderRequest {
    pub messages: Vec<ModelMessage>,
    #[builder(default)]
    pub settings: GenerationSettings,
    pub tools: Option<Vec<ToolDefinition>>,
}

/// Tool definition sent to the provider.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Definitions for every tool in `registry`, or `None` when it is empty.
    pub fn from_registry(registry: &ToolRegistry) -> Option<Vec<ToolDefinition>> {
        if registry.is_empty() {
            return None;
        }
        Some(
            registry
                .tools()
                .map(|tool| ToolDefinition {
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    parameters: tool.parameters().schema.clone(),
                })
                .collect(),
        )
    }
}

/// A streaming model backend.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name (e.g. "openai").
    fn provider_name(&self) -> &str;

    fn model_id(&self) -> &str;

    /// Start a streamed completion. Errors returned here happen before any
    /// delta; errors inside the stream happen mid-response.
    async fn stream_text(&self, request: &ProviderRequest) -> Result<DeltaStream>;
}
