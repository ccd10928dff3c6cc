//! VCS provider client interface
//!
//! Repo and PR operations are hosted by an external provider (GitHub-style).
//! Only the interface lives here; the daemon is handed an implementation at
//! startup, and tests use a scripted mock.

use async_trait::async_trait;
use thiserror::Error;

/// Provider operation errors
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("No provider client configured")]
    MissingClient,

    #[error("No auth token available")]
    MissingToken,

    #[error("Provider API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),
}

/// A created repository
#[derive(Debug, Clone)]
pub struct RepoInfo {
    pub owner: String,
    pub name: String,
    pub clone_url: String,
}

/// A created pull request
#[derive(Debug, Clone)]
pub struct PrInfo {
    pub number: u64,
    pub url: String,
}

/// Provider-hosted repo and PR operations
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Create a repository under the owner
    async fn create_repo(&self, owner: &str, name: &str, private: bool) -> Result<RepoInfo, ProviderError>;

    /// Open a pull request
    async fn create_pr(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<PrInfo, ProviderError>;

    /// Merge a pull request
    async fn merge_pr(&self, owner: &str, repo: &str, number: u64) -> Result<(), ProviderError>;
}
