//! Named-tool dispatch.
//!
//! Tools are registered under exact names; the required capability scope
//! `tool:<name>` is formed from the requested name, so authority over one
//! tool never implies authority over another.

pub mod echo;
pub mod pricing;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ToolResult;

/// Output map of a tool invocation: named byte values.
pub type ToolOutputs = HashMap<String, Vec<u8>>;

/// A named tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, arguments: &HashMap<String, String>) -> ToolResult<ToolOutputs>;
}

/// Registry mapping tool names to handlers.
#[derive(Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("compute_pricing", Arc::new(pricing::ComputePricing));
        registry.register("echo", Arc::new(echo::EchoTool));
        registry
    }

    pub fn register(&mut self, name: &str, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(name.to_string(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let registry = ToolRegistry::with_builtins();
        assert!(registry.get("compute_pricing").is_some());
        assert!(registry.get("echo").is_some());
        assert!(registry.get("sql_query").is_none());
        assert_eq!(registry.names(), vec!["compute_pricing", "echo"]);
    }

    #[tokio::test]
    async fn test_custom_registration() {
        struct Nop;

        #[async_trait]
        impl ToolHandler for Nop {
            async fn invoke(&self, _: &HashMap<String, String>) -> ToolResult<ToolOutputs> {
                Ok(ToolOutputs::new())
            }
        }

        let mut registry = ToolRegistry::new();
        registry.register("nop", Arc::new(Nop));
        let handler = registry.get("nop").unwrap();
        assert!(handler.invoke(&HashMap::new()).await.unwrap().is_empty());
    }
}
