//! Provider registry for dynamic provider resolution.

use std::collections::HashMap;
use std::sync::Arc;

use super::{ModelProvider, ProviderConfig, ProviderFactory};
use crate::error::{Result, TollgateError};

/// Registry mapping provider keys to their factories.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: HashMap<String, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for all provider keys it declares.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        for key in factory.provider_keys() {
            self.factories.insert(key.to_string(), factory.clone());
        }
    }

    pub fn factory(&self, provider_key: &str) -> Result<&Arc<dyn ProviderFactory>> {
        self.factories.get(provider_key).ok_or_else(|| {
            TollgateError::ModelNotFound(format!(
                "No provider factory registered for '{provider_key}'"
            ))
        })
    }

    /// Create a provider, failing before any network interaction when a
    /// mandatory credential is absent or blank.
    pub fn create_provider(&self, config: &ProviderConfig) -> Result<Arc<dyn ModelProvider>> {
        let factory = self.factory(&config.provider_id)?;
        if factory.requires_credential(&config.provider_id) {
            let present = config
                .credential
                .as_deref()
                .is_some_and(|key| !key.trim().is_empty());
            if !present {
                return Err(TollgateError::Authentication(format!(
                    "provider '{}' requires an API key",
                    config.provider_id
                )));
            }
        }
        factory.create(config)
    }

    pub fn has_provider(&self, provider_key: &str) -> bool {
        self.factories.contains_key(provider_key)
    }

    pub fn provider_keys(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.provider_keys())
            .finish()
    }
}
