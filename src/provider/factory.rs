//! Provider factory trait for creating `ModelProvider` instances.

use std::sync::Arc;

use super::ModelProvider;
use crate::error::Result;

/// Everything a factory needs to build a provider handle.
#[derive(Clone, PartialEq)]
pub struct ProviderConfig {
    pub provider_id: String,
    pub model_id: String,
    pub credential: Option<String>,
    pub base_url: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider_id", &self.provider_id)
            .field("model_id", &self.model_id)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Factory for creating providers from a provider key + model id.
pub trait ProviderFactory: Send + Sync {
    /// Provider key(s) this factory handles (e.g. `&["openai"]`).
    fn provider_keys(&self) -> &[&str];

    /// Whether the provider refuses to start without a credential.
    fn requires_credential(&self, _provider_key: &str) -> bool {
        true
    }

    /// Model used when settings do not name one.
    fn default_model(&self, _provider_key: &str) -> Option<&str> {
        None
    }

    fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn ModelProvider>>;
}
