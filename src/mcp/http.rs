//! Streamable-HTTP MCP servers backed by `rmcp`.

use std::sync::Arc;

use async_trait::async_trait;
use rmcp::{
    model::{CallToolRequestParams, CallToolResult, ClientInfo, JsonObject},
    service::{DynService, RoleClient, RunningService, ServiceExt},
    transport::StreamableHttpClientTransport,
};
use tokio::sync::Mutex;

use super::{ExternalServerConnector, ExternalToolServer};
use crate::config::McpServerSettings;
use crate::error::{Result, TollgateError};
use crate::tools::{AgentToolParameters, DynamicTool};

type McpSession = RunningService<RoleClient, Box<dyn DynService<RoleClient>>>;

/// A remote MCP server reached over streamable HTTP.
pub struct HttpToolServer {
    name: String,
    url: String,
    session: Mutex<Option<McpSession>>,
}

impl HttpToolServer {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            session: Mutex::new(None),
        }
    }

    fn error(&self, message: impl Into<String>) -> TollgateError {
        TollgateError::ExternalServer {
            server: self.name.clone(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl ExternalToolServer for HttpToolServer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Ok(());
        }
        let transport = StreamableHttpClientTransport::from_uri(self.url.clone());
        let service = ClientInfo::default()
            .into_dyn()
            .serve(transport)
            .await
            .map_err(|e| self.error(format!("initialize failed: {e}")))?;
        *session = Some(service);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let Some(service) = self.session.lock().await.take() else {
            return Ok(());
        };
        service
            .cancel()
            .await
            .map_err(|e| self.error(format!("shutdown failed: {e}")))?;
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<DynamicTool>> {
        let session = self.session.lock().await;
        let service = session.as_ref().ok_or_else(|| self.error("not connected"))?;
        let tools = service
            .list_all_tools()
            .await
            .map_err(|e| self.error(format!("list_tools: {e}")))?;
        Ok(tools
            .into_iter()
            .map(|tool| DynamicTool {
                name: tool.name.to_string(),
                description: tool.description.map(|d| d.to_string()).unwrap_or_default(),
                parameters: AgentToolParameters::from_schema(serde_json::Value::Object(
                    (*tool.input_schema).clone(),
                )),
                requires_approval: false,
            })
            .collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let session = self.session.lock().await;
        let service = session.as_ref().ok_or_else(|| self.error("not connected"))?;
        let result = service
            .call_tool(CallToolRequestParams {
                meta: None,
                name: name.to_owned().into(),
                arguments: coerce_arguments(arguments)?,
                task: None,
            })
            .await
            .map_err(|e| self.error(format!("call_tool: {e}")))?;
        into_value(name, result)
    }
}

fn coerce_arguments(value: serde_json::Value) -> Result<Option<JsonObject>> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Object(map) => Ok(Some(map)),
        other => Err(TollgateError::InvalidArgument(format!(
            "MCP tool arguments must be a JSON object; got {other}"
        ))),
    }
}

fn into_value(name: &str, result: CallToolResult) -> Result<serde_json::Value> {
    let text = result
        .content
        .iter()
        .filter_map(|item| item.as_text().map(|t| t.text.clone()))
        .collect::<Vec<_>>()
        .join("\n");

    if result.is_error.unwrap_or(false) {
        return Err(TollgateError::ToolExecution {
            tool_name: name.to_string(),
            message: if text.is_empty() {
                "MCP tool returned an error result".into()
            } else {
                text
            },
        });
    }
    if let Some(structured) = result.structured_content {
        return Ok(structured);
    }
    Ok(serde_json::Value::String(text))
}

/// Connector that builds [`HttpToolServer`]s from settings entries.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpServerConnector;

impl ExternalServerConnector for HttpServerConnector {
    fn server_for(&self, settings: &McpServerSettings) -> Result<Arc<dyn ExternalToolServer>> {
        if settings.url.trim().is_empty() {
            return Err(TollgateError::Configuration(format!(
                "MCP server '{}' has no url",
                settings.name
            )));
        }
        Ok(Arc::new(HttpToolServer::new(&settings.name, &settings.url)))
    }
}
