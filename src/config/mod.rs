//! Agent settings (layered: settings file > environment).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TollgateError};

/// Default number of model round trips allowed within one logical turn.
pub const DEFAULT_MAX_TURNS: usize = 10;

/// System prompt used when settings do not provide one.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Use the available tools when they help answer the user.";

/// User-facing settings that drive configuration resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentSettings {
    pub default_provider: Option<String>,
    pub tools_enabled: bool,
    /// Allow-list of tool names. `None` enables every registered tool.
    pub enabled_tools: Option<Vec<String>>,
    pub system_prompt: Option<String>,
    pub mcp_servers: Vec<McpServerSettings>,
    pub providers: HashMap<String, ProviderSettings>,
    pub use_secrets_manager: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            default_provider: None,
            tools_enabled: true,
            enabled_tools: None,
            system_prompt: None,
            mcp_servers: Vec::new(),
            providers: HashMap::new(),
            use_secrets_manager: false,
        }
    }
}

/// One remote tool server entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct McpServerSettings {
    pub url: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Gate every tool of this server behind human approval.
    #[serde(default = "default_true")]
    pub require_approval: bool,
}

/// Per-provider parameters.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ProviderSettings {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub max_turns: Option<usize>,
}

fn default_true() -> bool {
    true
}

impl AgentSettings {
    /// Parse settings from a TOML string.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        Ok(toml::from_str(input)?)
    }

    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// Load from the platform config directory, falling back to defaults
    /// when no settings file exists yet.
    pub fn load_default() -> Result<Self> {
        let Some(path) = Self::default_path() else {
            return Ok(Self::default());
        };
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// `<config dir>/tollgate/settings.toml` on the current platform.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "tollgate", "tollgate")
            .map(|dirs| dirs.config_dir().join("settings.toml"))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write settings as TOML, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// The active provider id, or a configuration error when none is set.
    pub fn active_provider(&self) -> Result<&str> {
        match self.default_provider.as_deref().map(str::trim) {
            Some(provider) if !provider.is_empty() => Ok(provider),
            _ => Err(TollgateError::Configuration(
                "no default provider configured".into(),
            )),
        }
    }

    pub fn provider(&self, provider: &str) -> Option<&ProviderSettings> {
        self.providers.get(provider)
    }

    pub fn system_prompt(&self) -> &str {
        self.system_prompt
            .as_deref()
            .filter(|prompt| !prompt.trim().is_empty())
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }
}

/// Environment variable carrying a provider's API key, e.g. `OPENAI_API_KEY`.
pub fn env_key_name(provider: &str) -> String {
    let normalized: String = provider
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{normalized}_API_KEY")
}

/// Read a provider API key from the environment (loading `.env` if present).
pub fn env_api_key(provider: &str) -> Option<String> {
    let _ = dotenvy::dotenv();
    std::env::var(env_key_name(provider))
        .ok()
        .filter(|key| !key.trim().is_empty())
}
