//! ToolContext - execution context for tools
//!
//! Each session gets one `ToolContext` scoping every operation to its git
//! worktree. The path sandbox is the hard boundary: absolute paths are
//! rejected outright, and relative paths must resolve to the worktree root
//! or a descendant after cleaning.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::quality::{QualityGate, QualityReport};
use crate::vcs::{ProviderClient, RepoInfo};

use super::ToolError;

/// Callback fired with each quality-gate report (used to post issue comments)
pub type QualityCallback = Arc<dyn Fn(&QualityReport) + Send + Sync>;

/// Callback fired after a provider repo creation so the owner can rebind
/// project state to the new repository
pub type RepoCreatedCallback = Arc<dyn Fn(&RepoInfo) + Send + Sync>;

/// Execution context for tools - scoped to a single session
#[derive(Clone)]
pub struct ToolContext {
    /// Git worktree path - all file ops constrained here
    pub worktree: PathBuf,

    /// Session ID (for logs and temp-file scoping)
    pub session_id: String,

    /// Quality gate bound to the worktree (lazy project detection)
    pub gate: Arc<QualityGate>,

    /// Provider client for repo/PR operations, if configured
    pub provider: Option<Arc<dyn ProviderClient>>,

    /// Auth token for pushes and provider calls
    pub auth_token: Option<String>,

    /// Repository owner on the provider
    pub repo_owner: Option<String>,

    /// Repository name on the provider
    pub repo_name: Option<String>,

    /// Base branch PRs target
    pub base_branch: String,

    /// Fired with every quality-gate report
    pub quality_callback: Option<QualityCallback>,

    /// Fired after a provider repo creation
    pub repo_created_callback: Option<RepoCreatedCallback>,
}

/// Default subprocess timeout, also the hard cap
pub const COMMAND_TIMEOUT_SECS: u64 = 300;

impl ToolContext {
    /// Create a new tool context for a session worktree
    pub fn new(worktree: PathBuf, session_id: String) -> Self {
        debug!(?worktree, %session_id, "ToolContext::new: called");
        let gate = Arc::new(QualityGate::new(&worktree, Duration::from_secs(COMMAND_TIMEOUT_SECS)));
        Self {
            worktree,
            session_id,
            gate,
            provider: None,
            auth_token: None,
            repo_owner: None,
            repo_name: None,
            base_branch: "main".to_string(),
            quality_callback: None,
            repo_created_callback: None,
        }
    }

    /// Builder method to attach a provider client
    pub fn with_provider(mut self, provider: Arc<dyn ProviderClient>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Builder method to set the auth token
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Builder method to bind the provider repository
    pub fn with_repo(mut self, owner: impl Into<String>, name: impl Into<String>) -> Self {
        self.repo_owner = Some(owner.into());
        self.repo_name = Some(name.into());
        self
    }

    /// Builder method to set the quality callback
    pub fn with_quality_callback(mut self, callback: QualityCallback) -> Self {
        self.quality_callback = Some(callback);
        self
    }

    /// Builder method to set the repo-created callback
    pub fn with_repo_created_callback(mut self, callback: RepoCreatedCallback) -> Self {
        self.repo_created_callback = Some(callback);
        self
    }

    /// Resolve a workspace-relative path inside the sandbox
    ///
    /// Rejects absolute paths; cleans the relative path, joins it with the
    /// worktree root, and verifies the result is the root or a strict
    /// descendant.
    pub fn resolve_path(&self, path: &str) -> Result<PathBuf, ToolError> {
        debug!(%path, "ToolContext::resolve_path: called");
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            return Err(ToolError::AbsolutePath {
                path: candidate.to_path_buf(),
            });
        }

        // Lexical clean: `.` drops, `..` pops. A `..` with nothing to pop
        // escapes the sandbox and is rejected.
        let mut cleaned = PathBuf::new();
        for component in candidate.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    if !cleaned.pop() {
                        return Err(ToolError::SandboxViolation {
                            path: candidate.to_path_buf(),
                            worktree: self.worktree.clone(),
                        });
                    }
                }
                Component::Normal(part) => cleaned.push(part),
                Component::RootDir | Component::Prefix(_) => {
                    return Err(ToolError::AbsolutePath {
                        path: candidate.to_path_buf(),
                    });
                }
            }
        }

        let joined = self.worktree.join(&cleaned);

        // Resolve symlinks where possible and re-verify containment
        let worktree_canonical = self.worktree.canonicalize().unwrap_or_else(|_| self.worktree.clone());
        let resolved = if joined.exists() {
            joined.canonicalize().unwrap_or_else(|_| joined.clone())
        } else {
            match joined.parent() {
                Some(parent) if parent.exists() => {
                    let canonical_parent = parent.canonicalize().unwrap_or_else(|_| parent.to_path_buf());
                    canonical_parent.join(joined.file_name().unwrap_or_default())
                }
                _ => joined.clone(),
            }
        };

        if resolved == worktree_canonical || resolved.starts_with(&worktree_canonical) {
            Ok(resolved)
        } else {
            debug!(?resolved, "ToolContext::resolve_path: sandbox violation");
            Err(ToolError::SandboxViolation {
                path: candidate.to_path_buf(),
                worktree: self.worktree.clone(),
            })
        }
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("worktree", &self.worktree)
            .field("session_id", &self.session_id)
            .field("has_provider", &self.provider.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn ctx(worktree: &Path) -> ToolContext {
        ToolContext::new(worktree.to_path_buf(), "test-sess".to_string())
    }

    #[test]
    fn test_resolve_relative_path() {
        let temp = tempdir().unwrap();
        let ctx = ctx(temp.path());
        let resolved = ctx.resolve_path("src/lib.rs").unwrap();
        assert!(resolved.ends_with("src/lib.rs"));
    }

    #[test]
    fn test_rejects_absolute_path() {
        let temp = tempdir().unwrap();
        let ctx = ctx(temp.path());
        assert!(matches!(ctx.resolve_path("/etc/passwd"), Err(ToolError::AbsolutePath { .. })));
    }

    #[test]
    fn test_rejects_parent_escape() {
        let temp = tempdir().unwrap();
        let ctx = ctx(temp.path());
        assert!(matches!(
            ctx.resolve_path("../../etc/passwd"),
            Err(ToolError::SandboxViolation { .. })
        ));
    }

    #[test]
    fn test_interior_dotdot_allowed() {
        let temp = tempdir().unwrap();
        let ctx = ctx(temp.path());
        let resolved = ctx.resolve_path("src/../docs/readme.md").unwrap();
        assert!(resolved.ends_with("docs/readme.md"));
        assert!(!resolved.to_string_lossy().contains(".."));
    }

    #[test]
    fn test_worktree_root_itself_allowed() {
        let temp = tempdir().unwrap();
        let ctx = ctx(temp.path());
        let resolved = ctx.resolve_path(".").unwrap();
        assert_eq!(resolved, temp.path().canonicalize().unwrap());
    }

    #[test]
    fn test_symlink_escape_rejected() {
        let temp = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let link = temp.path().join("sneaky");
        std::os::unix::fs::symlink(outside.path(), &link).unwrap();
        fs::write(outside.path().join("secret.txt"), "s").unwrap();

        let ctx = ctx(temp.path());
        assert!(matches!(
            ctx.resolve_path("sneaky/secret.txt"),
            Err(ToolError::SandboxViolation { .. })
        ));
    }

    #[test]
    fn test_new_file_in_existing_dir_allowed() {
        let temp = tempdir().unwrap();
        let ctx = ctx(temp.path());
        let resolved = ctx.resolve_path("new_file.txt").unwrap();
        assert!(resolved.ends_with("new_file.txt"));
    }

    proptest::proptest! {
        // Any path the sandbox accepts resolves to the worktree root or a
        // descendant of it.
        #[test]
        fn accepted_paths_stay_inside_worktree(raw in "[a-zA-Z0-9_./]{1,48}") {
            let temp = tempdir().unwrap();
            let ctx = ctx(temp.path());
            if let Ok(resolved) = ctx.resolve_path(&raw) {
                let root = temp.path().canonicalize().unwrap();
                assert!(resolved == root || resolved.starts_with(&root), "{:?} escaped", resolved);
            }
        }
    }
}
