//! Resolution of settings into an immutable per-turn agent configuration.

use std::sync::Arc;

use bon::Builder;
use tokio::sync::Mutex;

use crate::config::{
    env_api_key, AgentSettings, ProviderSettings, DEFAULT_MAX_TURNS, DEFAULT_SYSTEM_PROMPT,
};
use crate::error::{Result, TollgateError};
use crate::mcp::{connect_servers, ConnectedServers, ExternalServerConnector};
use crate::provider::{ModelProvider, ProviderConfig, ProviderRegistry};
use crate::secrets::{provider_secret_key, SecretsStore, PROVIDER_NAMESPACE};
use crate::tools::ToolRegistry;
use crate::types::GenerationSettings;

/// Everything one turn runs with. Captured at the start of a turn and never
/// changed underneath it.
#[derive(Clone, Builder)]
pub struct AgentConfiguration {
    pub provider: Arc<dyn ModelProvider>,
    #[builder(into, default = DEFAULT_SYSTEM_PROMPT.to_string())]
    pub instructions: String,
    #[builder(default)]
    pub tools: ToolRegistry,
    #[builder(default)]
    pub settings: GenerationSettings,
    #[builder(default = DEFAULT_MAX_TURNS)]
    pub max_turns: usize,
}

impl std::fmt::Debug for AgentConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfiguration")
            .field("provider", &self.provider.provider_name())
            .field("model", &self.provider.model_id())
            .field("tools", &self.tools)
            .field("settings", &self.settings)
            .field("max_turns", &self.max_turns)
            .finish()
    }
}

struct ResolverState {
    settings: AgentSettings,
    tools: ToolRegistry,
    cached: Option<Arc<AgentConfiguration>>,
    servers: ConnectedServers,
}

/// Builds [`AgentConfiguration`]s from settings and caches the result until
/// settings, tools, or providers change.
pub struct ConfigurationResolver {
    providers: ProviderRegistry,
    secrets: Option<Arc<dyn SecretsStore>>,
    connector: Option<Arc<dyn ExternalServerConnector>>,
    state: Mutex<ResolverState>,
}

impl ConfigurationResolver {
    pub fn new(settings: AgentSettings, providers: ProviderRegistry) -> Self {
        Self {
            providers,
            secrets: None,
            connector: default_connector(),
            state: Mutex::new(ResolverState {
                settings,
                tools: ToolRegistry::new(),
                cached: None,
                servers: ConnectedServers::default(),
            }),
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.state.get_mut().tools = tools;
        self
    }

    pub fn with_secrets_store(mut self, store: Arc<dyn SecretsStore>) -> Self {
        self.secrets = Some(store);
        self
    }

    pub fn with_connector(mut self, connector: Arc<dyn ExternalServerConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub async fn settings(&self) -> AgentSettings {
        self.state.lock().await.settings.clone()
    }

    /// Replace settings; the next [`resolve`](Self::resolve) rebuilds.
    pub async fn update_settings(&self, settings: AgentSettings) {
        let mut state = self.state.lock().await;
        state.settings = settings;
        state.cached = None;
    }

    /// Replace the local tool set; the next resolve rebuilds.
    pub async fn set_tools(&self, tools: ToolRegistry) {
        let mut state = self.state.lock().await;
        state.tools = tools;
        state.cached = None;
    }

    /// Drop the cached configuration (e.g. after a credential changed).
    pub async fn invalidate(&self) {
        self.state.lock().await.cached = None;
    }

    /// Close every connected external tool server.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.cached = None;
        state.servers.close_all().await;
    }

    /// The current configuration, building it when the cache is empty.
    pub async fn resolve(&self) -> Result<Arc<AgentConfiguration>> {
        let mut state = self.state.lock().await;
        if let Some(cached) = &state.cached {
            return Ok(cached.clone());
        }

        let settings = state.settings.clone();
        let provider_id = settings.active_provider()?.to_string();
        let factory = self.providers.factory(&provider_id)?;
        let provider_settings = settings.provider(&provider_id).cloned().unwrap_or_default();
        let model_id = provider_settings
            .model
            .clone()
            .filter(|model| !model.trim().is_empty())
            .or_else(|| factory.default_model(&provider_id).map(str::to_string))
            .ok_or_else(|| {
                TollgateError::Configuration(format!(
                    "no model configured for provider '{provider_id}'"
                ))
            })?;
        let credential = self
            .credential(&settings, &provider_id, &provider_settings)
            .await?;
        let provider = self.providers.create_provider(&ProviderConfig {
            provider_id: provider_id.clone(),
            model_id,
            credential,
            base_url: provider_settings.base_url.clone(),
        })?;

        // Servers from the previous configuration are replaced wholesale.
        state.servers.close_all().await;
        let mut tools = ToolRegistry::new();
        if settings.tools_enabled {
            tools = state.tools.select(settings.enabled_tools.as_deref());
            state.servers = self.connect_external(&settings).await;
            for tool in &state.servers.tools {
                tools.register(tool.clone());
            }
        }

        let configuration = Arc::new(AgentConfiguration {
            provider,
            instructions: settings.system_prompt().to_string(),
            tools,
            settings: GenerationSettings {
                temperature: provider_settings.temperature,
                max_tokens: provider_settings.max_tokens,
            },
            max_turns: provider_settings.max_turns.unwrap_or(DEFAULT_MAX_TURNS),
        });
        tracing::debug!(
            provider = %provider_id,
            model = configuration.provider.model_id(),
            tools = configuration.tools.len(),
            max_turns = configuration.max_turns,
            "agent configuration resolved"
        );
        state.cached = Some(configuration.clone());
        Ok(configuration)
    }

    async fn credential(
        &self,
        settings: &AgentSettings,
        provider_id: &str,
        provider_settings: &ProviderSettings,
    ) -> Result<Option<String>> {
        if settings.use_secrets_manager {
            let store = self.secrets.as_ref().ok_or_else(|| {
                TollgateError::Configuration(
                    "use_secrets_manager is set but no secrets store is configured".into(),
                )
            })?;
            let secret = store
                .get(PROVIDER_NAMESPACE, &provider_secret_key(provider_id))
                .await?;
            return Ok(secret.map(|s| s.value));
        }
        Ok(provider_settings
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| env_api_key(provider_id)))
    }

    async fn connect_external(&self, settings: &AgentSettings) -> ConnectedServers {
        if !settings.mcp_servers.iter().any(|entry| entry.enabled) {
            return ConnectedServers::default();
        }
        match &self.connector {
            Some(connector) => connect_servers(connector.as_ref(), &settings.mcp_servers).await,
            None => {
                tracing::warn!(
                    servers = settings.mcp_servers.len(),
                    "external tool servers configured but no connector is available"
                );
                ConnectedServers::default()
            }
        }
    }
}

#[cfg(feature = "mcp")]
fn default_connector() -> Option<Arc<dyn ExternalServerConnector>> {
    Some(Arc::new(crate::mcp::HttpServerConnector))
}

#[cfg(not(feature = "mcp"))]
fn default_connector() -> Option<Arc<dyn ExternalServerConnector>> {
    None
}

impl std::fmt::Debug for ConfigurationResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationResolver")
            .field("providers", &self.providers)
            .field("secrets", &self.secrets.as_ref().map(|_| ".."))
            .finish()
    }
}
