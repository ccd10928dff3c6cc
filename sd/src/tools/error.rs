//! Tool error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during tool execution
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("path escapes worktree: {path} is outside {worktree}")]
    SandboxViolation { path: PathBuf, worktree: PathBuf },

    #[error("absolute paths are not allowed: {path}")]
    AbsolutePath { path: PathBuf },

    #[error("command rejected by denylist: {pattern}")]
    DangerousCommand { pattern: String },

    #[error("command timed out after {timeout_secs}s")]
    CommandTimeout { timeout_secs: u64 },

    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
