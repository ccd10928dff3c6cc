//! list_files tool

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use walkdir::WalkDir;

use crate::tools::{Tool, ToolContext, ToolResult};

/// List directory entries, optionally recursive
pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &'static str {
        "list_files"
    }

    fn description(&self) -> &'static str {
        "List files and directories under a worktree path. Directories carry a trailing slash."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Worktree-relative directory (default: worktree root)"
                },
                "recursive": {
                    "type": "boolean",
                    "description": "Recurse into subdirectories (default: false)"
                }
            }
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "ListFilesTool::execute: called");
        let path = input["path"].as_str().unwrap_or(".");
        let recursive = input["recursive"].as_bool().unwrap_or(false);

        let resolved = match ctx.resolve_path(path) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if !resolved.is_dir() {
            return ToolResult::error(format!("Not a directory: {}", path));
        }

        let mut names = Vec::new();
        if recursive {
            for entry in WalkDir::new(&resolved).min_depth(1).sort_by_file_name() {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => return ToolResult::error(format!("Failed to walk {}: {}", path, e)),
                };
                let rel = entry.path().strip_prefix(&resolved).unwrap_or(entry.path());
                let mut name = rel.display().to_string();
                if entry.file_type().is_dir() {
                    name.push('/');
                }
                names.push(name);
            }
        } else {
            let mut dir = match tokio::fs::read_dir(&resolved).await {
                Ok(d) => d,
                Err(e) => return ToolResult::error(format!("Failed to list {}: {}", path, e)),
            };
            while let Ok(Some(entry)) = dir.next_entry().await {
                let mut name = entry.file_name().to_string_lossy().to_string();
                if entry.path().is_dir() {
                    name.push('/');
                }
                names.push(name);
            }
            names.sort();
        }

        ToolResult::success(names.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, ToolContext) {
        let temp = tempdir().unwrap();
        std::fs::create_dir(temp.path().join("src")).unwrap();
        std::fs::write(temp.path().join("src/lib.rs"), "").unwrap();
        std::fs::write(temp.path().join("README.md"), "").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());
        (temp, ctx)
    }

    #[tokio::test]
    async fn test_list_non_recursive() {
        let (_temp, ctx) = setup();
        let result = ListFilesTool.execute(serde_json::json!({}), &ctx).await;
        assert!(!result.is_error);
        let lines: Vec<&str> = result.content.lines().collect();
        assert_eq!(lines, vec!["README.md", "src/"]);
    }

    #[tokio::test]
    async fn test_list_recursive() {
        let (_temp, ctx) = setup();
        let result = ListFilesTool.execute(serde_json::json!({"recursive": true}), &ctx).await;
        assert!(!result.is_error);
        assert!(result.content.contains("src/\n") || result.content.ends_with("src/"));
        assert!(result.content.contains("src/lib.rs"));
    }

    #[tokio::test]
    async fn test_list_missing_dir() {
        let (_temp, ctx) = setup();
        let result = ListFilesTool.execute(serde_json::json!({"path": "nope"}), &ctx).await;
        assert!(result.is_error);
    }
}
