//! task_complete tool - the completion validator
//!
//! Runs the enabled quality checks in sequence and returns the aggregated
//! in-band report (`QUALITY_PASSED:` / `QUALITY_BLOCKED:`). The execution
//! loop reads the marker to drive the health monitor; the optional callback
//! mirrors the report outward (issue comments).

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::tools::{Tool, ToolContext, ToolResult};

pub struct TaskCompleteTool;

#[async_trait]
impl Tool for TaskCompleteTool {
    fn name(&self) -> &'static str {
        "task_complete"
    }

    fn description(&self) -> &'static str {
        "Validate task completion: runs tests, lint, and build, and reports QUALITY_PASSED or QUALITY_BLOCKED."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "summary": {
                    "type": "string",
                    "description": "Brief summary of what was accomplished"
                },
                "skip_tests": {
                    "type": "boolean",
                    "description": "Skip the test check (default: false)"
                },
                "skip_lint": {
                    "type": "boolean",
                    "description": "Skip the lint check (default: false)"
                },
                "skip_build": {
                    "type": "boolean",
                    "description": "Skip the build check (default: false)"
                }
            },
            "required": ["summary"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "TaskCompleteTool::execute: called");
        let summary = match input["summary"].as_str() {
            Some(s) => s,
            None => return ToolResult::error("summary is required"),
        };
        let skip_tests = input["skip_tests"].as_bool().unwrap_or(false);
        let skip_lint = input["skip_lint"].as_bool().unwrap_or(false);
        let skip_build = input["skip_build"].as_bool().unwrap_or(false);

        let report = ctx.gate.run_all(skip_tests, skip_lint, skip_build).await;

        info!(
            session_id = %ctx.session_id,
            passed = report.passed,
            %summary,
            "task_complete validation finished"
        );

        if let Some(callback) = &ctx.quality_callback {
            callback(&report);
        }

        let mut content = report.render();
        content.push_str(&format!("\n\nSummary: {}", summary));

        // Blocked is a verdict, not an execution error; the loop counts it
        // through the marker.
        ToolResult::success(content)
    }
}
