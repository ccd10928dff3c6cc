//! Checklist domain types
//!
//! A task has at most one checklist; its items are the acceptance criteria
//! the completion gate enforces before honoring `EVENT:task.complete`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::generate_id;

/// Checklist item status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Pending,
    Done,
    Failed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Done => "done",
            ItemStatus::Failed => "failed",
        }
    }
}

/// One acceptance criterion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistItem {
    /// Identifier the model references in `CHECKLIST_DONE:<id>`
    pub id: String,

    /// What must be true for this item to pass
    pub description: String,

    /// Current status
    #[serde(default)]
    pub status: ItemStatus,

    /// Failure reason or completion notes
    #[serde(default)]
    pub notes: String,
}

impl ChecklistItem {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            status: ItemStatus::Pending,
            notes: String::new(),
        }
    }
}

/// Ordered set of acceptance criteria for a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checklist {
    /// Unique identifier
    pub id: String,

    /// Owning task
    pub task_id: String,

    /// Items in order
    pub items: Vec<ChecklistItem>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Checklist {
    pub fn new(task_id: impl Into<String>, items: Vec<ChecklistItem>) -> Self {
        let task_id = task_id.into();
        Self {
            id: generate_id("check", &task_id),
            task_id,
            items,
            created_at: Utc::now(),
        }
    }

    /// Items that are not `done`
    pub fn open_items(&self) -> Vec<&ChecklistItem> {
        self.items.iter().filter(|i| i.status != ItemStatus::Done).collect()
    }

    /// Whether every item is `done`
    pub fn all_done(&self) -> bool {
        self.items.iter().all(|i| i.status == ItemStatus::Done)
    }

    /// Find an item by id
    pub fn item(&self, id: &str) -> Option<&ChecklistItem> {
        self.items.iter().find(|i| i.id == id)
    }

    /// Counts of (done, total)
    pub fn progress(&self) -> (usize, usize) {
        let done = self.items.iter().filter(|i| i.status == ItemStatus::Done).count();
        (done, self.items.len())
    }
}
