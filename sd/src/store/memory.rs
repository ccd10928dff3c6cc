//! In-memory store implementation
//!
//! Backs the test suite and single-process daemon runs. All collections
//! live behind one RwLock; every accessor clones out so callers never hold
//! references into the store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::{
    ActivityRecord, Checklist, EventRecord, ItemStatus, Memory, Project, Session, SessionState, Task, TaskStatus,
    TerminationReason,
};

use super::{CheckpointRecord, Store, StoreError, StoreResult};

#[derive(Default)]
struct Inner {
    tasks: HashMap<String, Task>,
    projects: HashMap<String, Project>,
    sessions: HashMap<String, Session>,
    checklists: Vec<Checklist>,
    events: Vec<EventRecord>,
    checkpoints: Vec<CheckpointRecord>,
    activity: Vec<ActivityRecord>,
    memories: Vec<Memory>,
}

/// In-memory [`Store`] implementation
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_task(&self, task: Task) -> StoreResult<()> {
        debug!(task_id = %task.id, "InMemoryStore::create_task: called");
        let mut inner = self.inner.write().await;
        if inner.tasks.contains_key(&task.id) {
            return Err(StoreError::AlreadyExists(task.id));
        }
        inner.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    async fn get_task(&self, id: &str) -> StoreResult<Option<Task>> {
        Ok(self.inner.read().await.tasks.get(id).cloned())
    }

    async fn update_task_status(&self, id: &str, status: TaskStatus) -> StoreResult<()> {
        debug!(%id, ?status, "InMemoryStore::update_task_status: called");
        let mut inner = self.inner.write().await;
        let task = inner.tasks.get_mut(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        task.status = status;
        Ok(())
    }

    async fn update_task_pr_number(&self, id: &str, pr_number: u64) -> StoreResult<()> {
        debug!(%id, pr_number, "InMemoryStore::update_task_pr_number: called");
        let mut inner = self.inner.write().await;
        let task = inner.tasks.get_mut(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        task.pr_number = Some(pr_number);
        Ok(())
    }

    async fn mark_task_worktree_cleaned(&self, id: &str) -> StoreResult<()> {
        debug!(%id, "InMemoryStore::mark_task_worktree_cleaned: called");
        let mut inner = self.inner.write().await;
        let task = inner.tasks.get_mut(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        task.worktree_cleaned = true;
        Ok(())
    }

    async fn create_project(&self, project: Project) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.projects.contains_key(&project.id) {
            return Err(StoreError::AlreadyExists(project.id));
        }
        inner.projects.insert(project.id.clone(), project);
        Ok(())
    }

    async fn get_project(&self, id: &str) -> StoreResult<Option<Project>> {
        Ok(self.inner.read().await.projects.get(id).cloned())
    }

    async fn update_project(&self, project: Project) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.projects.contains_key(&project.id) {
            return Err(StoreError::NotFound(project.id));
        }
        inner.projects.insert(project.id.clone(), project);
        Ok(())
    }

    async fn create_session(&self, session: Session) -> StoreResult<()> {
        debug!(session_id = %session.id, "InMemoryStore::create_session: called");
        let mut inner = self.inner.write().await;
        if inner.sessions.contains_key(&session.id) {
            return Err(StoreError::AlreadyExists(session.id));
        }
        inner.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get_session(&self, id: &str) -> StoreResult<Option<Session>> {
        Ok(self.inner.read().await.sessions.get(id).cloned())
    }

    async fn update_session(&self, session: Session) -> StoreResult<()> {
        debug!(session_id = %session.id, state = %session.state, "InMemoryStore::update_session: called");
        let mut inner = self.inner.write().await;
        if !inner.sessions.contains_key(&session.id) {
            return Err(StoreError::NotFound(session.id));
        }
        inner.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.sessions.remove(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(())
    }

    async fn list_sessions(&self) -> StoreResult<Vec<Session>> {
        Ok(self.inner.read().await.sessions.values().cloned().collect())
    }

    async fn list_active_sessions(&self) -> StoreResult<Vec<Session>> {
        Ok(self
            .inner
            .read()
            .await
            .sessions
            .values()
            .filter(|s| matches!(s.state, SessionState::Running | SessionState::Paused))
            .cloned()
            .collect())
    }

    async fn update_session_termination(
        &self,
        id: &str,
        state: SessionState,
        reason: TerminationReason,
        quality_gate_attempts: u32,
    ) -> StoreResult<()> {
        debug!(%id, %state, %reason, quality_gate_attempts, "InMemoryStore::update_session_termination: called");
        let mut inner = self.inner.write().await;
        let session = inner.sessions.get_mut(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        session.state = state;
        session.termination_reason = Some(reason);
        session.quality_gate_attempts = quality_gate_attempts;
        Ok(())
    }

    async fn create_checklist(&self, checklist: Checklist) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.checklists.iter().any(|c| c.task_id == checklist.task_id) {
            return Err(StoreError::Constraint(format!(
                "task {} already has a checklist",
                checklist.task_id
            )));
        }
        inner.checklists.push(checklist);
        Ok(())
    }

    async fn get_checklist_for_task(&self, task_id: &str) -> StoreResult<Option<Checklist>> {
        Ok(self
            .inner
            .read()
            .await
            .checklists
            .iter()
            .find(|c| c.task_id == task_id)
            .cloned())
    }

    async fn update_checklist_item(
        &self,
        task_id: &str,
        item_id: &str,
        status: ItemStatus,
        notes: &str,
    ) -> StoreResult<bool> {
        debug!(%task_id, %item_id, ?status, "InMemoryStore::update_checklist_item: called");
        let mut inner = self.inner.write().await;
        let Some(checklist) = inner.checklists.iter_mut().find(|c| c.task_id == task_id) else {
            return Ok(false);
        };
        let Some(item) = checklist.items.iter_mut().find(|i| i.id == item_id) else {
            return Ok(false);
        };
        item.status = status;
        item.notes = notes.to_string();
        Ok(true)
    }

    async fn create_event(&self, event: EventRecord) -> StoreResult<()> {
        debug!(topic = %event.topic, session_id = %event.session_id, "InMemoryStore::create_event: called");
        self.inner.write().await.events.push(event);
        Ok(())
    }

    async fn list_events_for_session(&self, session_id: &str) -> StoreResult<Vec<EventRecord>> {
        Ok(self
            .inner
            .read()
            .await
            .events
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn save_checkpoint(&self, record: CheckpointRecord) -> StoreResult<()> {
        debug!(session_id = %record.session_id, iteration = record.iteration, "InMemoryStore::save_checkpoint: called");
        self.inner.write().await.checkpoints.push(record);
        Ok(())
    }

    async fn latest_checkpoint(&self, session_id: &str) -> StoreResult<Option<CheckpointRecord>> {
        Ok(self
            .inner
            .read()
            .await
            .checkpoints
            .iter()
            .filter(|c| c.session_id == session_id)
            .max_by_key(|c| c.iteration)
            .cloned())
    }

    async fn create_activity(&self, record: ActivityRecord) -> StoreResult<()> {
        self.inner.write().await.activity.push(record);
        Ok(())
    }

    async fn list_activity_for_session(&self, session_id: &str) -> StoreResult<Vec<ActivityRecord>> {
        Ok(self
            .inner
            .read()
            .await
            .activity
            .iter()
            .filter(|a| a.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn session_tokens_from_activity(&self, session_id: &str) -> StoreResult<(u64, u64)> {
        let inner = self.inner.read().await;
        let mut input = 0;
        let mut output = 0;
        for record in inner.activity.iter().filter(|a| a.session_id == session_id) {
            input += record.input_tokens.unwrap_or(0);
            output += record.output_tokens.unwrap_or(0);
        }
        Ok((input, output))
    }

    async fn create_memory(&self, memory: Memory) -> StoreResult<()> {
        debug!(memory_id = %memory.id, kind = ?memory.kind, "InMemoryStore::create_memory: called");
        self.inner.write().await.memories.push(memory);
        Ok(())
    }

    async fn list_memories_for_project(&self, project_id: &str) -> StoreResult<Vec<Memory>> {
        Ok(self
            .inner
            .read()
            .await
            .memories
            .iter()
            .filter(|m| m.project_id == project_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChecklistItem, Hat};

    #[tokio::test]
    async fn test_task_crud() {
        let store = InMemoryStore::new();
        let task = Task::new("t", "d", "proj-1");
        let id = task.id.clone();

        store.create_task(task.clone()).await.unwrap();
        assert!(matches!(store.create_task(task).await, Err(StoreError::AlreadyExists(_))));

        store.update_task_pr_number(&id, 42).await.unwrap();
        store.update_task_status(&id, TaskStatus::Completed).await.unwrap();
        store.mark_task_worktree_cleaned(&id).await.unwrap();

        let loaded = store.get_task(&id).await.unwrap().unwrap();
        assert_eq!(loaded.pr_number, Some(42));
        assert_eq!(loaded.status, TaskStatus::Completed);
        assert!(loaded.worktree_cleaned);
    }

    #[tokio::test]
    async fn test_active_session_listing() {
        let store = InMemoryStore::new();
        let mut running = Session::new("task-1", "proj-1", Hat::Planner, "/tmp/wt1");
        running.state = SessionState::Running;
        let mut paused = Session::new("task-2", "proj-1", Hat::Creator, "/tmp/wt2");
        paused.state = SessionState::Paused;
        let mut done = Session::new("task-3", "proj-1", Hat::Editor, "/tmp/wt3");
        done.state = SessionState::Completed;

        for s in [running, paused, done] {
            store.create_session(s).await.unwrap();
        }

        let active = store.list_active_sessions().await.unwrap();
        assert_eq!(active.len(), 2);
    }

    #[tokio::test]
    async fn test_one_checklist_per_task() {
        let store = InMemoryStore::new();
        let list = Checklist::new("task-1", vec![ChecklistItem::new("it-1", "works")]);
        store.create_checklist(list).await.unwrap();

        let dup = Checklist::new("task-1", vec![]);
        assert!(matches!(store.create_checklist(dup).await, Err(StoreError::Constraint(_))));
    }

    #[tokio::test]
    async fn test_update_checklist_item_missing_returns_false() {
        let store = InMemoryStore::new();
        let list = Checklist::new("task-1", vec![ChecklistItem::new("it-1", "works")]);
        store.create_checklist(list).await.unwrap();

        assert!(store.update_checklist_item("task-1", "it-1", ItemStatus::Done, "").await.unwrap());
        assert!(!store.update_checklist_item("task-1", "it-9", ItemStatus::Done, "").await.unwrap());
        assert!(!store.update_checklist_item("task-9", "it-1", ItemStatus::Done, "").await.unwrap());
    }

    #[tokio::test]
    async fn test_latest_checkpoint_wins() {
        let store = InMemoryStore::new();
        for iteration in [5, 15, 10] {
            store
                .save_checkpoint(CheckpointRecord {
                    session_id: "sess-1".to_string(),
                    iteration,
                    payload: serde_json::json!({ "iteration": iteration }),
                })
                .await
                .unwrap();
        }

        let latest = store.latest_checkpoint("sess-1").await.unwrap().unwrap();
        assert_eq!(latest.iteration, 15);
        assert!(store.latest_checkpoint("sess-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_tokens_from_activity() {
        let store = InMemoryStore::new();
        for (input, output) in [(100, 40), (200, 60)] {
            store
                .create_activity(
                    ActivityRecord::new(
                        "sess-1",
                        1,
                        Hat::Creator,
                        crate::domain::ActivityKind::AssistantResponse,
                        serde_json::json!({}),
                    )
                    .with_tokens(input, output),
                )
                .await
                .unwrap();
        }

        let (input, output) = store.session_tokens_from_activity("sess-1").await.unwrap();
        assert_eq!((input, output), (300, 100));
    }
}
