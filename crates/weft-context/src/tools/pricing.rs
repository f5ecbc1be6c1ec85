//! Stock-driven price recommendation.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{ToolError, ToolResult};
use crate::tools::{ToolHandler, ToolOutputs};

/// Recommends a price from the current stock count:
/// `recommended_price = max(0, 100.0 - 0.1 * stock_count)`.
#[derive(Debug, Default)]
pub struct ComputePricing;

#[async_trait]
impl ToolHandler for ComputePricing {
    async fn invoke(&self, arguments: &HashMap<String, String>) -> ToolResult<ToolOutputs> {
        let stock_count: i64 = arguments
            .get("stock_count")
            .map(String::as_str)
            .unwrap_or("0")
            .parse()
            .map_err(|_| ToolError::InvalidArguments("stock_count must be an integer".into()))?;

        let recommended_price = (100.0 - 0.1 * stock_count as f64).max(0.0);

        let mut outputs = ToolOutputs::new();
        outputs.insert(
            "recommended_price".to_string(),
            format!("{}", recommended_price).into_bytes(),
        );
        Ok(outputs)
    }
}
