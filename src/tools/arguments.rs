//! Typed access to tool call arguments.

use crate::error::{Result, TollgateError};

/// Wrapper around tool call arguments providing typed extraction.
#[derive(Debug, Clone)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    /// Wrap raw arguments. A JSON-encoded string is parsed into its value
    /// so tools always see structured input.
    pub fn new(value: serde_json::Value) -> Self {
        let value = match value {
            serde_json::Value::String(raw) if raw.trim().is_empty() => serde_json::json!({}),
            serde_json::Value::String(raw) => {
                serde_json::from_str(raw.trim()).unwrap_or(serde_json::Value::String(raw))
            }
            other => other,
        };
        Self { value }
    }

    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    pub fn get_str(&self, key: &str) -> Result<&str> {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| missing("string", key))
    }

    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    pub fn get_i64(&self, key: &str) -> Result<i64> {
        self.value
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| missing("integer", key))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.value
            .get(key)
            .and_then(|v| v.as_bool())
            .ok_or_else(|| missing("boolean", key))
    }

    /// Deserialize the entire arguments into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.value.clone()).map_err(|e| {
            TollgateError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
        })
    }
}

fn missing(kind: &str, key: &str) -> TollgateError {
    TollgateError::InvalidArgument(format!("Missing {kind} argument: {key}"))
}
