//! Tool system
//!
//! The closed set of operations the LLM may request against a session's
//! worktree. Each session gets a `ToolContext` scoping file operations to
//! its worktree; tools cannot escape the sandbox.

mod context;
mod error;
mod executor;
mod shaper;
mod traits;

pub mod builtin;

pub use context::{COMMAND_TIMEOUT_SECS, QualityCallback, RepoCreatedCallback, ToolContext};
pub use error::ToolError;
pub use executor::{ToolExecutor, ToolProfile};
pub use shaper::{DEFAULT_THRESHOLD, ResponseShaper};
pub use traits::{Tool, ToolResult};
