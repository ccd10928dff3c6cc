//! ToolExecutor - dispatch for the closed tool set
//!
//! Each hat gets the profile its contract allows; every result passes
//! through the large-response shaper before it reaches the transcript.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::domain::Hat;
use crate::llm::{ToolCall, ToolDefinition};

use super::builtin::{
    CreatePrTool, CreateRepoTool, GitCommitTool, GitPushTool, GitStatusTool, ListFilesTool, ReadFileTool,
    RunBuildTool, RunCommandTool, RunLintTool, RunTestsTool, TaskCompleteTool, WriteFileTool,
};
use super::shaper::ResponseShaper;
use super::{Tool, ToolContext, ToolResult};

/// Which tools a hat may call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolProfile {
    /// Full access: file writes, git, provider, quality gate
    #[default]
    Full,
    /// Read and inspect only: no writes, no git mutation, no provider
    ReadOnly,
}

impl ToolProfile {
    /// Profile for a hat, derived from its role
    pub fn for_hat(hat: Hat) -> Self {
        match hat {
            Hat::Explorer | Hat::Planner | Hat::Designer => ToolProfile::ReadOnly,
            Hat::Creator | Hat::Critic | Hat::Editor | Hat::Resolver => ToolProfile::Full,
        }
    }
}

/// Manages tool execution for one session
pub struct ToolExecutor {
    tools: HashMap<String, Box<dyn Tool>>,
    shaper: Arc<ResponseShaper>,
}

impl ToolExecutor {
    /// Create executor with the given profile
    pub fn with_profile(profile: ToolProfile, shaper: Arc<ResponseShaper>) -> Self {
        debug!(?profile, "ToolExecutor::with_profile: called");
        let mut tools: HashMap<String, Box<dyn Tool>> = HashMap::new();

        // Inspection tools are available everywhere
        tools.insert("read_file".into(), Box::new(ReadFileTool));
        tools.insert("list_files".into(), Box::new(ListFilesTool));
        tools.insert("git_status".into(), Box::new(GitStatusTool));
        tools.insert("run_tests".into(), Box::new(RunTestsTool));
        tools.insert("run_lint".into(), Box::new(RunLintTool));
        tools.insert("run_build".into(), Box::new(RunBuildTool));

        if profile == ToolProfile::Full {
            tools.insert("write_file".into(), Box::new(WriteFileTool));
            tools.insert("run_command".into(), Box::new(RunCommandTool));
            tools.insert("git_commit".into(), Box::new(GitCommitTool));
            tools.insert("git_push".into(), Box::new(GitPushTool));
            tools.insert("create_repo".into(), Box::new(CreateRepoTool));
            tools.insert("create_pr".into(), Box::new(CreatePrTool));
            tools.insert("task_complete".into(), Box::new(TaskCompleteTool));
        }

        Self { tools, shaper }
    }

    /// Create executor for a hat
    pub fn for_hat(hat: Hat, shaper: Arc<ResponseShaper>) -> Self {
        Self::with_profile(ToolProfile::for_hat(hat), shaper)
    }

    /// Tool definitions for the LLM request
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Execute one tool call; output is shaped before returning
    pub async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        debug!(tool_name = %call.name, tool_id = %call.id, "ToolExecutor::execute: called");
        let result = match self.tools.get(&call.name) {
            Some(tool) => tool.execute(call.input.clone(), ctx).await,
            None => ToolResult::error(format!("Unknown tool: {}", call.name)),
        };

        ToolResult {
            content: self.shaper.shape(&call.name, result.content),
            is_error: result.is_error,
        }
    }

    /// Check if a tool exists in this profile
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Tool names in this profile
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}
