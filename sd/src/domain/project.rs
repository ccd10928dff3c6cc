//! Project domain type
//!
//! Projects are created and owned by an external agent; sessiond only reads
//! them and updates the repository binding after a provider repo creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::generate_id;

/// A project a set of tasks belongs to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Provider owner (user or org)
    pub owner: String,

    /// Repository name on the provider
    pub repo: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: impl Into<String>, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: generate_id("proj", &name),
            name,
            owner: owner.into(),
            repo: repo.into(),
            created_at: Utc::now(),
        }
    }
}
