//! Task domain type
//!
//! A task is one unit of user intent. It is created by an external agent;
//! the session manager only mutates its status and PR number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::generate_id;

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, no session has picked it up yet
    #[default]
    Created,
    /// A session is (or has been) working it
    Active,
    /// Completed with an acknowledged checklist
    Completed,
    /// The transition tracker detected a hat loop; no new sessions allowed
    Quarantined,
    /// User deleted the task
    Deleted,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Quarantined => "quarantined",
            Self::Deleted => "deleted",
        };
        write!(f, "{}", s)
    }
}

/// A unit of user intent worked by sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: String,

    /// Short title
    pub title: String,

    /// Full description handed to the first hat
    pub description: String,

    /// Branch the task's worktree is checked out on
    pub branch: String,

    /// Owning project
    pub project_id: String,

    /// Linked issue number, if the task came from the tracker
    #[serde(default)]
    pub issue_number: Option<u64>,

    /// PR opened for this task, once one exists
    #[serde(default)]
    pub pr_number: Option<u64>,

    /// 0 = a human must merge; >0 = the orchestrator may merge on its own
    #[serde(default)]
    pub autonomy: u8,

    /// Model family chosen for this task
    pub model: String,

    /// Current status
    #[serde(default)]
    pub status: TaskStatus,

    /// Whether the worktree has been removed after a merge
    #[serde(default)]
    pub worktree_cleaned: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Create a new task with a generated ID
    pub fn new(title: impl Into<String>, description: impl Into<String>, project_id: impl Into<String>) -> Self {
        let title = title.into();
        let id = generate_id("task", &title);
        let branch = format!("sessiond/{}", id);
        Self {
            id,
            title,
            description: description.into(),
            branch,
            project_id: project_id.into(),
            issue_number: None,
            pr_number: None,
            autonomy: 0,
            model: "claude-sonnet-4-20250514".to_string(),
            status: TaskStatus::Created,
            worktree_cleaned: false,
            created_at: Utc::now(),
        }
    }

    /// Builder method to set the autonomy level
    pub fn with_autonomy(mut self, autonomy: u8) -> Self {
        self.autonomy = autonomy;
        self
    }

    /// Builder method to set the model family
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}
