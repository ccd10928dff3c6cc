//! Git tools - proxied to the vcs module

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolResult};
use crate::vcs;

/// Show porcelain status of the worktree
pub struct GitStatusTool;

#[async_trait]
impl Tool for GitStatusTool {
    fn name(&self) -> &'static str {
        "git_status"
    }

    fn description(&self) -> &'static str {
        "Show the git status of the worktree (porcelain format)."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _input: Value, ctx: &ToolContext) -> ToolResult {
        debug!("GitStatusTool::execute: called");
        match vcs::status(&ctx.worktree).await {
            Ok(out) if out.trim().is_empty() => ToolResult::success("working tree clean"),
            Ok(out) => ToolResult::success(out),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

/// Stage requested paths and commit
pub struct GitCommitTool;

#[async_trait]
impl Tool for GitCommitTool {
    fn name(&self) -> &'static str {
        "git_commit"
    }

    fn description(&self) -> &'static str {
        "Stage the given paths (all changes when omitted) and create a commit."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "Commit message"
                },
                "paths": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Paths to stage; omit to stage everything"
                }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "GitCommitTool::execute: called");
        let message = match input["message"].as_str() {
            Some(m) if !m.trim().is_empty() => m,
            _ => return ToolResult::error("message is required"),
        };

        let paths: Vec<String> = input["paths"]
            .as_array()
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();

        match vcs::stage_and_commit(&ctx.worktree, &paths, message).await {
            Ok(sha) => ToolResult::success(format!("Committed {}", sha)),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

/// Push the current branch to origin
pub struct GitPushTool;

#[async_trait]
impl Tool for GitPushTool {
    fn name(&self) -> &'static str {
        "git_push"
    }

    fn description(&self) -> &'static str {
        "Push the current branch to origin."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "branch": {
                    "type": "string",
                    "description": "Branch to push (default: current branch)"
                }
            }
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "GitPushTool::execute: called");
        let branch = match input["branch"].as_str() {
            Some(b) => b.to_string(),
            None => match vcs::current_branch(&ctx.worktree).await {
                Ok(b) => b,
                Err(e) => return ToolResult::error(e.to_string()),
            },
        };

        match vcs::push(&ctx.worktree, &branch, ctx.auth_token.as_deref()).await {
            Ok(out) => ToolResult::success(out),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}
