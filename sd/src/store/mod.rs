//! Persistent store interface
//!
//! The orchestrator treats storage as an opaque record API. Everything the
//! loop and manager persist goes through [`Store`]; the bundled
//! [`InMemoryStore`] backs tests and single-process runs, and a durable
//! backend implements the same trait out of tree.

use async_trait::async_trait;

use crate::domain::{
    ActivityRecord, Checklist, EventRecord, ItemStatus, Memory, Project, Session, SessionState, Task, TaskStatus,
    TerminationReason,
};

mod error;
mod memory;

pub use error::StoreError;
pub use memory::InMemoryStore;

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// A saved checkpoint blob keyed by session + iteration
#[derive(Debug, Clone)]
pub struct CheckpointRecord {
    pub session_id: String,
    pub iteration: u32,
    pub payload: serde_json::Value,
}

/// Opaque record API over tasks, sessions, checklists, events, checkpoints,
/// activity, and memories
#[async_trait]
pub trait Store: Send + Sync {
    // === Tasks ===

    async fn create_task(&self, task: Task) -> StoreResult<()>;
    async fn get_task(&self, id: &str) -> StoreResult<Option<Task>>;
    async fn update_task_status(&self, id: &str, status: TaskStatus) -> StoreResult<()>;
    async fn update_task_pr_number(&self, id: &str, pr_number: u64) -> StoreResult<()>;
    async fn mark_task_worktree_cleaned(&self, id: &str) -> StoreResult<()>;

    // === Projects ===

    async fn create_project(&self, project: Project) -> StoreResult<()>;
    async fn get_project(&self, id: &str) -> StoreResult<Option<Project>>;
    async fn update_project(&self, project: Project) -> StoreResult<()>;

    // === Sessions ===

    async fn create_session(&self, session: Session) -> StoreResult<()>;
    async fn get_session(&self, id: &str) -> StoreResult<Option<Session>>;
    async fn update_session(&self, session: Session) -> StoreResult<()>;
    async fn delete_session(&self, id: &str) -> StoreResult<()>;
    async fn list_sessions(&self) -> StoreResult<Vec<Session>>;

    /// Sessions the store marks `running` or `paused`, for startup recovery
    async fn list_active_sessions(&self) -> StoreResult<Vec<Session>>;

    /// Persist the final termination reason and quality-gate attempt count
    async fn update_session_termination(
        &self,
        id: &str,
        state: SessionState,
        reason: TerminationReason,
        quality_gate_attempts: u32,
    ) -> StoreResult<()>;

    // === Checklists ===

    async fn create_checklist(&self, checklist: Checklist) -> StoreResult<()>;
    async fn get_checklist_for_task(&self, task_id: &str) -> StoreResult<Option<Checklist>>;

    /// Update one item; returns false when the item does not exist
    async fn update_checklist_item(
        &self,
        task_id: &str,
        item_id: &str,
        status: ItemStatus,
        notes: &str,
    ) -> StoreResult<bool>;

    // === Events ===

    async fn create_event(&self, event: EventRecord) -> StoreResult<()>;
    async fn list_events_for_session(&self, session_id: &str) -> StoreResult<Vec<EventRecord>>;

    // === Checkpoints ===

    async fn save_checkpoint(&self, record: CheckpointRecord) -> StoreResult<()>;

    /// Latest checkpoint for a session, if any
    async fn latest_checkpoint(&self, session_id: &str) -> StoreResult<Option<CheckpointRecord>>;

    // === Activity ===

    async fn create_activity(&self, record: ActivityRecord) -> StoreResult<()>;
    async fn list_activity_for_session(&self, session_id: &str) -> StoreResult<Vec<ActivityRecord>>;

    /// Authoritative token counters derived from the activity log
    async fn session_tokens_from_activity(&self, session_id: &str) -> StoreResult<(u64, u64)>;

    // === Memories ===

    async fn create_memory(&self, memory: Memory) -> StoreResult<()>;
    async fn list_memories_for_project(&self, project_id: &str) -> StoreResult<Vec<Memory>>;
}
