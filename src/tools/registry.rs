//! Name-indexed tool registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::tool::Tool;

/// Registry mapping tool names to invokable tools.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        self.tools.insert(tool.name().to_string(), tool);
        self
    }

    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn tools(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.values()
    }

    /// The subset of tools named in `enabled`, or every tool when `None`.
    /// Unknown names are ignored.
    pub fn select(&self, enabled: Option<&[String]>) -> ToolRegistry {
        match enabled {
            None => self.clone(),
            Some(names) => ToolRegistry {
                tools: self
                    .tools
                    .iter()
                    .filter(|(name, _)| names.iter().any(|n| n == *name))
                    .map(|(name, tool)| (name.clone(), tool.clone()))
                    .collect(),
            },
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
