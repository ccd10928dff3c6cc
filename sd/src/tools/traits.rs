//! Tool trait definition

use async_trait::async_trait;
use serde_json::Value;

use super::context::ToolContext;

/// A tool the LLM may call against the session workspace
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (matches the `tool_use` block name)
    fn name(&self) -> &'static str;

    /// Human-readable description for the model
    fn description(&self) -> &'static str;

    /// JSON Schema for input parameters
    fn input_schema(&self) -> Value;

    /// Execute the tool
    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult;
}

/// Result of a tool execution
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    /// Create a successful result
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    /// Create an error result
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}
