//! Argument echo, useful for capability probes and connectivity checks.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::ToolResult;
use crate::tools::{ToolHandler, ToolOutputs};

#[derive(Debug, Default)]
pub struct EchoTool;

#[async_trait]
impl ToolHandler for EchoTool {
    async fn invoke(&self, arguments: &HashMap<String, String>) -> ToolResult<ToolOutputs> {
        Ok(arguments
            .iter()
            .map(|(k, v)| (k.clone(), v.clone().into_bytes()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_returns_arguments() {
        let mut arguments = HashMap::new();
        arguments.insert("ping".to_string(), "pong".to_string());
        let outputs = EchoTool.invoke(&arguments).await.unwrap();
        assert_eq!(outputs.get("ping").unwrap(), b"pong");
    }

    #[tokio::test]
    async fn test_echo_empty() {
        let outputs = EchoTool.invoke(&HashMap::new()).await.unwrap();
        assert!(outputs.is_empty());
    }
}
