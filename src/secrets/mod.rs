//! Secret storage for provider credentials.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;

/// Namespace under which provider credentials are stored.
pub const PROVIDER_NAMESPACE: &str = "tollgate:providers";

/// Key for a provider's API key within [`PROVIDER_NAMESPACE`].
pub fn provider_secret_key(provider: &str) -> String {
    format!("{provider}_api_key")
}

/// A stored secret value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secret {
    pub value: String,
}

/// Async key/value store for secrets, addressed by namespace and key.
#[async_trait]
pub trait SecretsStore: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Secret>>;

    async fn set(&self, namespace: &str, key: &str, value: String) -> Result<()>;
}

/// Process-local secrets store.
#[derive(Debug, Default)]
pub struct InMemorySecretsStore {
    entries: RwLock<HashMap<(String, String), String>>,
}

impl InMemorySecretsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretsStore for InMemorySecretsStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Secret>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(&(namespace.to_string(), key.to_string()))
            .map(|value| Secret {
                value: value.clone(),
            }))
    }

    async fn set(&self, namespace: &str, key: &str, value: String) -> Result<()> {
        self.entries
            .write()
            .await
            .insert((namespace.to_string(), key.to_string()), value);
        Ok(())
    }
}
