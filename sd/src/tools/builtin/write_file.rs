//! write_file tool

use std::os::unix::fs::PermissionsExt;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Write a file into the worktree, creating parent directories
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Write a file in the worktree, creating parent directories as needed. Overwrites existing content."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Worktree-relative path to write"
                },
                "content": {
                    "type": "string",
                    "description": "Full file content"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(path = ?input["path"], "WriteFileTool::execute: called");
        let path = match input["path"].as_str() {
            Some(p) => p,
            None => return ToolResult::error("path is required"),
        };
        let content = match input["content"].as_str() {
            Some(c) => c,
            None => return ToolResult::error("content is required"),
        };

        let resolved = match ctx.resolve_path(path) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if let Some(parent) = resolved.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::error(format!("Failed to create directories for {}: {}", path, e));
            }
            let _ = std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o755));
        }

        match tokio::fs::write(&resolved, content).await {
            Ok(()) => {
                let _ = std::fs::set_permissions(&resolved, std::fs::Permissions::from_mode(0o644));
                ToolResult::success(format!("Wrote {} bytes to {}", content.len(), path))
            }
            Err(e) => ToolResult::error(format!("Failed to write {}: {}", path, e)),
        }
    }
}
