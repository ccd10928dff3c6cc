//! Provider tools - repo and PR operations through the configured client

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::tools::{Tool, ToolContext, ToolResult};
use crate::vcs;

/// Create a repository on the provider
pub struct CreateRepoTool;

#[async_trait]
impl Tool for CreateRepoTool {
    fn name(&self) -> &'static str {
        "create_repo"
    }

    fn description(&self) -> &'static str {
        "Create a repository on the configured provider and bind the project to it."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Repository name"
                },
                "private": {
                    "type": "boolean",
                    "description": "Create as private (default: true)"
                }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "CreateRepoTool::execute: called");
        let Some(provider) = &ctx.provider else {
            return ToolResult::error("No provider client configured");
        };
        let name = match input["name"].as_str() {
            Some(n) => n,
            None => return ToolResult::error("name is required"),
        };
        let Some(owner) = ctx.repo_owner.as_deref() else {
            return ToolResult::error("No repository owner bound to this session");
        };
        let private = input["private"].as_bool().unwrap_or(true);

        match provider.create_repo(owner, name, private).await {
            Ok(repo) => {
                info!(owner = %repo.owner, name = %repo.name, "CreateRepoTool: repository created");
                if let Some(callback) = &ctx.repo_created_callback {
                    callback(&repo);
                }
                ToolResult::success(format!("Created repository {}/{} ({})", repo.owner, repo.name, repo.clone_url))
            }
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

/// Open a pull request for the current branch
pub struct CreatePrTool;

#[async_trait]
impl Tool for CreatePrTool {
    fn name(&self) -> &'static str {
        "create_pr"
    }

    fn description(&self) -> &'static str {
        "Push the current branch and open a pull request against the base branch."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": {
                    "type": "string",
                    "description": "PR title"
                },
                "body": {
                    "type": "string",
                    "description": "PR body"
                },
                "base": {
                    "type": "string",
                    "description": "Base branch (default: the session's base branch)"
                }
            },
            "required": ["title"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "CreatePrTool::execute: called");
        let Some(provider) = &ctx.provider else {
            return ToolResult::error("No provider client configured");
        };
        let (Some(owner), Some(repo)) = (ctx.repo_owner.as_deref(), ctx.repo_name.as_deref()) else {
            return ToolResult::error("No repository bound to this session");
        };
        let title = match input["title"].as_str() {
            Some(t) => t,
            None => return ToolResult::error("title is required"),
        };
        let body = input["body"].as_str().unwrap_or("");
        let base = input["base"].as_str().unwrap_or(&ctx.base_branch);

        let head = match vcs::current_branch(&ctx.worktree).await {
            Ok(b) => b,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        // The branch must exist on the remote before the provider will
        // accept a PR for it.
        if let Err(e) = vcs::push(&ctx.worktree, &head, ctx.auth_token.as_deref()).await {
            return ToolResult::error(format!("Pre-push failed: {}", e));
        }

        match provider.create_pr(owner, repo, title, body, &head, base).await {
            Ok(pr) => {
                info!(number = pr.number, "CreatePrTool: pull request opened");
                ToolResult::success(format!("Opened PR #{}: {}", pr.number, pr.url))
            }
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}
