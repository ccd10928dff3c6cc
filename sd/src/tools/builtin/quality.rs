//! Quality-check tools - run_tests, run_lint, run_build

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::quality::CheckOutcome;
use crate::tools::{Tool, ToolContext, ToolResult};

fn render_outcome(outcome: &CheckOutcome) -> ToolResult {
    let header = if outcome.passed {
        format!("{} passed ({} ms)", outcome.kind.as_str(), outcome.duration_ms)
    } else {
        format!(
            "{} failed (exit {}, {} ms)",
            outcome.kind.as_str(),
            outcome.exit_code,
            outcome.duration_ms
        )
    };
    let content = if outcome.output.is_empty() {
        header
    } else {
        format!("{}\n{}", header, outcome.output)
    };

    if outcome.passed {
        ToolResult::success(content)
    } else {
        ToolResult::error(content)
    }
}

/// Run the project's test suite
pub struct RunTestsTool;

#[async_trait]
impl Tool for RunTestsTool {
    fn name(&self) -> &'static str {
        "run_tests"
    }

    fn description(&self) -> &'static str {
        "Run the canonical test command for the detected project type."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "verbose": {
                    "type": "boolean",
                    "description": "Verbose test output (default: false)"
                }
            }
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "RunTestsTool::execute: called");
        let verbose = input["verbose"].as_bool().unwrap_or(false);
        render_outcome(&ctx.gate.run_tests(verbose).await)
    }
}

/// Run the project's linter
pub struct RunLintTool;

#[async_trait]
impl Tool for RunLintTool {
    fn name(&self) -> &'static str {
        "run_lint"
    }

    fn description(&self) -> &'static str {
        "Run the canonical lint command for the detected project type."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "fix": {
                    "type": "boolean",
                    "description": "Apply automatic fixes where supported (default: false)"
                }
            }
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "RunLintTool::execute: called");
        let fix = input["fix"].as_bool().unwrap_or(false);
        render_outcome(&ctx.gate.run_lint(fix).await)
    }
}

/// Run the project's build
pub struct RunBuildTool;

#[async_trait]
impl Tool for RunBuildTool {
    fn name(&self) -> &'static str {
        "run_build"
    }

    fn description(&self) -> &'static str {
        "Run the canonical build command for the detected project type."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _input: Value, ctx: &ToolContext) -> ToolResult {
        debug!("RunBuildTool::execute: called");
        render_outcome(&ctx.gate.run_build().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_run_tests_unknown_project_skips() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());

        let result = RunTestsTool.execute(serde_json::json!({}), &ctx).await;
        assert!(!result.is_error);
        assert!(result.content.contains("skipped"));
    }

    #[tokio::test]
    async fn test_run_build_make_project() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("Makefile"), "all:\n\t@echo built\n").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());

        let result = RunBuildTool.execute(serde_json::json!({}), &ctx).await;
        assert!(!result.is_error, "{}", result.content);
        assert!(result.content.contains("built"));
    }
}
