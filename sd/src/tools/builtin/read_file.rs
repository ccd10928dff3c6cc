//! read_file tool

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Read a file from the worktree
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read a file from the worktree. Path is relative to the worktree root."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Worktree-relative path to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "ReadFileTool::execute: called");
        let path = match input["path"].as_str() {
            Some(p) => p,
            None => return ToolResult::error("path is required"),
        };

        let resolved = match ctx.resolve_path(path) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        match tokio::fs::read(&resolved).await {
            Ok(bytes) => ToolResult::success(String::from_utf8_lossy(&bytes).to_string()),
            Err(e) => ToolResult::error(format!("Failed to read {}: {}", path, e)),
        }
    }
}
