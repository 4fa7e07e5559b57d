//! External tool servers (Model Context Protocol and similar).
//!
//! A server is connected while the agent configuration is resolved. Servers
//! that fail to connect or list their tools are logged and skipped; the agent
//! keeps running with the remaining tools.

#[cfg(feature = "mcp")]
pub mod http;

#[cfg(feature = "mcp")]
pub use http::{HttpServerConnector, HttpToolServer};

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::McpServerSettings;
use crate::error::Result;
use crate::tools::{
    DynamicTool, DynamicToolAdapter, DynamicToolProvider, Tool, ToolArguments,
    ToolExecutionContext,
};

/// A remote capability server, identified by name.
#[async_trait]
pub trait ExternalToolServer: Send + Sync {
    fn name(&self) -> &str;

    async fn connect(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;

    async fn list_tools(&self) -> Result<Vec<DynamicTool>>;

    async fn call_tool(&self, name: &str, arguments: serde_json::Value)
        -> Result<serde_json::Value>;
}

/// Builds a server handle from its settings entry.
pub trait ExternalServerConnector: Send + Sync {
    fn server_for(&self, settings: &McpServerSettings) -> Result<Arc<dyn ExternalToolServer>>;
}

/// Exposes a connected server's tools as a [`DynamicToolProvider`].
pub struct ExternalServerTools {
    server: Arc<dyn ExternalToolServer>,
    require_approval: bool,
}

impl ExternalServerTools {
    pub fn new(server: Arc<dyn ExternalToolServer>, require_approval: bool) -> Self {
        Self {
            server,
            require_approval,
        }
    }
}

#[async_trait]
impl DynamicToolProvider for ExternalServerTools {
    async fn list_tools(&self) -> Result<Vec<DynamicTool>> {
        let mut tools = self.server.list_tools().await?;
        for tool in &mut tools {
            tool.requires_approval |= self.require_approval;
        }
        Ok(tools)
    }

    async fn execute_tool(
        &self,
        name: &str,
        args: &ToolArguments,
        _ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value> {
        self.server.call_tool(name, args.raw().clone()).await
    }
}

/// Servers that connected successfully, plus the tools they expose.
///
/// Servers still held when this is dropped (for example when a resolve is
/// cancelled midway through connecting) are closed on a background task.
#[derive(Default)]
pub struct ConnectedServers {
    pub servers: Vec<Arc<dyn ExternalToolServer>>,
    pub tools: Vec<Arc<dyn Tool>>,
}

impl ConnectedServers {
    /// Close every server, logging failures.
    pub async fn close_all(&mut self) {
        for server in self.servers.drain(..) {
            close_server(server.as_ref()).await;
        }
        self.tools.clear();
    }
}

impl Drop for ConnectedServers {
    fn drop(&mut self) {
        if self.servers.is_empty() {
            return;
        }
        let servers = std::mem::take(&mut self.servers);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    for server in servers {
                        close_server(server.as_ref()).await;
                    }
                });
            }
            Err(_) => tracing::warn!(
                servers = servers.len(),
                "external tool servers dropped outside a runtime; not closed"
            ),
        }
    }
}

async fn close_server(server: &dyn ExternalToolServer) {
    if let Err(error) = server.close().await {
        tracing::warn!(server = server.name(), %error, "failed to close external tool server");
    }
}

/// Connect every enabled server. Failures degrade to "no tools from that
/// server" and never abort.
pub async fn connect_servers(
    connector: &dyn ExternalServerConnector,
    settings: &[McpServerSettings],
) -> ConnectedServers {
    let mut connected = ConnectedServers::default();
    for entry in settings.iter().filter(|entry| entry.enabled) {
        let server = match connector.server_for(entry) {
            Ok(server) => server,
            Err(error) => {
                tracing::warn!(server = %entry.name, url = %entry.url, %error, "skipping external tool server");
                continue;
            }
        };
        if let Err(error) = server.connect().await {
            tracing::warn!(server = %entry.name, url = %entry.url, %error, "external tool server failed to connect");
            continue;
        }
        let provider = Arc::new(ExternalServerTools::new(
            server.clone(),
            entry.require_approval,
        ));
        match DynamicToolAdapter::discover(provider).await {
            Ok(tools) => {
                tracing::debug!(server = %entry.name, tools = tools.len(), "external tool server connected");
                connected.tools.extend(tools);
                connected.servers.push(server);
            }
            Err(error) => {
                tracing::warn!(server = %entry.name, %error, "external tool server failed to list tools");
                if let Err(error) = server.close().await {
                    tracing::warn!(server = %entry.name, %error, "failed to close external tool server");
                }
            }
        }
    }
    connected
}
