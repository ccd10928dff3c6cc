//! run_command tool - execute shell commands in the worktree

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::tools::context::COMMAND_TIMEOUT_SECS;
use crate::tools::{Tool, ToolContext, ToolResult};

/// Fixed denylist of command shapes that are never run
static DENYLIST: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (Regex::new(r"\brm\s+(?:-[a-zA-Z]+\s+)+/(?:\s|\*|$)").expect("static regex"), "recursive root delete"),
        (Regex::new(r"(?i)(^|\s|;|&&|\|)sudo\s").expect("static regex"), "sudo"),
        (Regex::new(r">\s*/dev/(sd|nvme|hd|mem)").expect("static regex"), "write to device node"),
        (Regex::new(r"\bdd\b[^|;]*\bof=/dev/").expect("static regex"), "write to device node"),
        (Regex::new(r"\bchmod\s+(?:-[a-zA-Z]+\s+)*0?777\b").expect("static regex"), "permissive chmod"),
        (Regex::new(r"\bmkfs(\.|\s)").expect("static regex"), "filesystem format"),
    ]
});

/// Check a command against the denylist; Some(reason) means reject
pub fn denied_reason(command: &str) -> Option<&'static str> {
    if command.contains(":(){") {
        return Some("fork bomb");
    }
    DENYLIST
        .iter()
        .find(|(regex, _)| regex.is_match(command))
        .map(|(_, reason)| *reason)
}

/// Execute a shell command in the worktree
pub struct RunCommandTool;

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &'static str {
        "run_command"
    }

    fn description(&self) -> &'static str {
        "Execute a shell command in the worktree. Use for git, build tools, tests."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute"
                },
                "timeout_secs": {
                    "type": "integer",
                    "description": "Timeout in seconds (default and max: 300)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "RunCommandTool::execute: called");
        let command = match input["command"].as_str() {
            Some(c) => c,
            None => return ToolResult::error("command is required"),
        };

        if let Some(reason) = denied_reason(command) {
            debug!(%reason, "RunCommandTool::execute: denylist match");
            return ToolResult::error(format!("Command rejected: {}", reason));
        }

        let timeout_secs = input["timeout_secs"]
            .as_u64()
            .unwrap_or(COMMAND_TIMEOUT_SECS)
            .min(COMMAND_TIMEOUT_SECS);

        debug!(%command, timeout_secs, "RunCommandTool::execute: spawning");
        let output = match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            tokio::process::Command::new("sh")
                .arg("-c")
                .arg(command)
                .current_dir(&ctx.worktree)
                .output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ToolResult::error(format!("Failed to execute command: {}", e)),
            Err(_) => return ToolResult::error(format!("Command timed out after {}s", timeout_secs)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let combined = if stdout.is_empty() && !stderr.is_empty() {
            stderr.to_string()
        } else if stderr.is_empty() {
            stdout.to_string()
        } else {
            format!("{}\n\nSTDERR:\n{}", stdout, stderr)
        };

        if output.status.success() {
            ToolResult::success(combined)
        } else {
            ToolResult::error(format!(
                "Exit code: {}\n{}",
                output.status.code().unwrap_or(-1),
                combined
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ctx() -> (tempfile::TempDir, ToolContext) {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());
        (temp, ctx)
    }

    #[test]
    fn test_denylist_matches() {
        assert_eq!(denied_reason("rm -rf /"), Some("recursive root delete"));
        assert_eq!(denied_reason("rm -r -f /"), Some("recursive root delete"));
        assert_eq!(denied_reason("sudo apt install"), Some("sudo"));
        assert_eq!(denied_reason("echo x > /dev/sda"), Some("write to device node"));
        assert_eq!(denied_reason("dd if=img of=/dev/sda"), Some("write to device node"));
        assert_eq!(denied_reason("chmod -R 777 ."), Some("permissive chmod"));
        assert_eq!(denied_reason("mkfs.ext4 /dev/sdb1"), Some("filesystem format"));
        assert_eq!(denied_reason(":(){ :|:& };:"), Some("fork bomb"));
    }

    #[test]
    fn test_denylist_allows_normal_commands() {
        for cmd in [
            "cargo test",
            "rm -rf target/debug",
            "git status",
            "chmod +x script.sh",
            "echo sudoku",
            "ls /tmp",
        ] {
            assert_eq!(denied_reason(cmd), None, "{} should be allowed", cmd);
        }
    }

    #[tokio::test]
    async fn test_run_command_basic() {
        let (_temp, ctx) = ctx();
        let result = RunCommandTool
            .execute(serde_json::json!({"command": "echo hello"}), &ctx)
            .await;
        assert!(!result.is_error);
        assert!(result.content.contains("hello"));
    }

    #[tokio::test]
    async fn test_run_command_runs_in_worktree() {
        let (temp, ctx) = ctx();
        let result = RunCommandTool.execute(serde_json::json!({"command": "pwd"}), &ctx).await;
        assert!(!result.is_error);
        let canonical = temp.path().canonicalize().unwrap();
        assert!(result.content.trim().ends_with(canonical.file_name().unwrap().to_str().unwrap()));
    }

    #[tokio::test]
    async fn test_run_command_failure_carries_exit_code() {
        let (_temp, ctx) = ctx();
        let result = RunCommandTool.execute(serde_json::json!({"command": "exit 7"}), &ctx).await;
        assert!(result.is_error);
        assert!(result.content.contains("Exit code: 7"));
    }

    #[tokio::test]
    async fn test_run_command_timeout() {
        let (_temp, ctx) = ctx();
        let result = RunCommandTool
            .execute(serde_json::json!({"command": "sleep 10", "timeout_secs": 1}), &ctx)
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("timed out"));
    }

    #[tokio::test]
    async fn test_run_command_rejects_denylisted() {
        let (_temp, ctx) = ctx();
        let result = RunCommandTool
            .execute(serde_json::json!({"command": "sudo rm -rf /"}), &ctx)
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("Command rejected"));
    }

    #[tokio::test]
    async fn test_run_command_missing_command() {
        let (_temp, ctx) = ctx();
        let result = RunCommandTool.execute(serde_json::json!({}), &ctx).await;
        assert!(result.is_error);
        assert!(result.content.contains("command is required"));
    }
}
