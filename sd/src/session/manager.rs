//! SessionManager - owns the lifetime of concurrent sessions
//!
//! One session per task, one tokio task per running loop. The registry maps
//! (`session id → session`, `task id → session id`) live behind a single
//! RwLock; session objects handed to callers are clones, so outside
//! mutation cannot leak in. Hat transitions are driven here: when a loop
//! exits with a next hat, the tracker is consulted, the old session is
//! retired, and a fresh session continues the same task and worktree.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde_json::json;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broadcast::Broadcaster;
use crate::checkpoint::Checkpoint;
use crate::config::Config;
use crate::context::LlmSummarizer;
use crate::domain::{Hat, Session, SessionState, Task, TaskStatus, TerminationReason};
use crate::events::TransitionTracker;
use crate::llm::LlmClient;
use crate::r#loop::{ExecutionLoop, LoopOutcome};
use crate::store::{Store, StoreError};
use crate::vcs::{self, ProviderClient};

/// Session lifecycle errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Task {0} already has an active session")]
    TaskAlreadyActive(String),

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Session {id} cannot start from state {state}")]
    InvalidState { id: String, state: SessionState },

    #[error("Task {0} is quarantined")]
    TaskQuarantined(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

struct RunningLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    pause_requested: bool,
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<String, Session>,
    by_task: HashMap<String, String>,
    running: HashMap<String, RunningLoop>,
}

/// Top-level owner of all sessions
pub struct SessionManager {
    store: Arc<dyn Store>,
    llm: Arc<dyn LlmClient>,
    broadcaster: Arc<dyn Broadcaster>,
    config: Config,
    provider: Option<Arc<dyn ProviderClient>>,
    auth_token: Option<String>,
    registry: RwLock<Registry>,
    trackers: Mutex<HashMap<String, TransitionTracker>>,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn Store>,
        llm: Arc<dyn LlmClient>,
        broadcaster: Arc<dyn Broadcaster>,
        config: Config,
    ) -> Arc<Self> {
        debug!("SessionManager::new: called");
        Arc::new(Self {
            store,
            llm,
            broadcaster,
            config,
            provider: None,
            auth_token: None,
            registry: RwLock::new(Registry::default()),
            trackers: Mutex::new(HashMap::new()),
        })
    }

    /// Construct with provider access for PR automation
    pub fn with_provider(
        store: Arc<dyn Store>,
        llm: Arc<dyn LlmClient>,
        broadcaster: Arc<dyn Broadcaster>,
        config: Config,
        provider: Arc<dyn ProviderClient>,
        auth_token: Option<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            llm,
            broadcaster,
            config,
            provider: Some(provider),
            auth_token,
            registry: RwLock::new(Registry::default()),
            trackers: Mutex::new(HashMap::new()),
        })
    }

    /// Create a session for a task
    ///
    /// Fails when the task is quarantined or already has an active session.
    pub async fn create_session(&self, task: &Task, hat: Hat, worktree: &str) -> Result<Session, SessionError> {
        debug!(task_id = %task.id, %hat, %worktree, "SessionManager::create_session: called");

        if task.status == TaskStatus::Quarantined {
            return Err(SessionError::TaskQuarantined(task.id.clone()));
        }

        let session = Session::new(&task.id, &task.project_id, hat, worktree).with_budget(self.config.budget);

        {
            let mut registry = self.registry.write().unwrap();
            if registry.by_task.contains_key(&task.id) {
                return Err(SessionError::TaskAlreadyActive(task.id.clone()));
            }
            registry.by_task.insert(task.id.clone(), session.id.clone());
            registry.sessions.insert(session.id.clone(), session.clone());
        }

        if let Err(e) = self.store.create_session(session.clone()).await {
            let mut registry = self.registry.write().unwrap();
            registry.by_task.remove(&task.id);
            registry.sessions.remove(&session.id);
            return Err(e.into());
        }

        self.trackers
            .lock()
            .unwrap()
            .entry(task.id.clone())
            .or_default()
            .record_start(hat);

        info!(session_id = %session.id, task_id = %task.id, %hat, "Session created");
        Ok(session)
    }

    /// Start a session's execution loop; returns immediately
    ///
    /// Returns an explicitly boxed future (rather than `async fn`) because
    /// `start` and `drive_transition` are mutually recursive (`start` spawns
    /// a loop that on hat transitions calls back into `start`); an opaque
    /// `impl Future` return type here is self-referential and the compiler
    /// cannot prove it `Send`.
    pub fn start<'a>(
        self: &'a Arc<Self>,
        session_id: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), SessionError>> + Send + 'a>> {
        Box::pin(async move {
        debug!(%session_id, "SessionManager::start: called");

        let mut session = {
            let mut registry = self.registry.write().unwrap();
            let session = registry
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
            if !session.state.can_start() {
                return Err(SessionError::InvalidState {
                    id: session_id.to_string(),
                    state: session.state,
                });
            }
            session.state = SessionState::Starting;
            session.clone()
        };

        let resume = session.iteration > 0;
        let task = self
            .store
            .get_task(&session.task_id)
            .await?
            .ok_or_else(|| SessionError::TaskNotFound(session.task_id.clone()))?;
        let project = self.store.get_project(&task.project_id).await.ok().flatten();

        session.state = SessionState::Running;
        {
            let mut registry = self.registry.write().unwrap();
            if let Some(stored) = registry.sessions.get_mut(session_id) {
                stored.state = SessionState::Running;
            }
        }
        if let Err(e) = self.store.update_session(session.clone()).await {
            warn!(error = %e, "SessionManager::start: session persist failed");
        }
        self.broadcaster.publish(
            "session.started",
            json!({ "session_id": session.id, "task_id": task.id, "hat": session.hat }),
        );

        let cancel = CancellationToken::new();
        let mut exec = ExecutionLoop::new(
            session,
            task,
            self.store.clone(),
            self.llm.clone(),
            self.broadcaster.clone(),
            &self.config,
            cancel.clone(),
        )
        .with_summarizer(Arc::new(LlmSummarizer::new(
            self.llm.clone(),
            self.config.llm.summary_model.clone(),
            self.config.llm.summary_model_deep.clone(),
        )));

        if let Some(provider) = &self.provider {
            let (owner, name) = project
                .map(|p| (Some(p.owner), Some(p.repo)))
                .unwrap_or((None, None));
            exec = exec.with_provider_access(provider.clone(), self.auth_token.clone(), owner, name);
        }

        let manager = Arc::clone(self);
        let id_for_task = session_id.to_string();
        let handle = tokio::spawn(async move {
            if resume {
                exec.restore(None).await;
            }
            let (session, outcome) = exec.run().await;
            manager.on_loop_finished(session, outcome).await;
        });

        {
            // A fast loop may already have finished and cleaned up; only
            // register the handle while its session is still live.
            let mut registry = self.registry.write().unwrap();
            if registry.sessions.contains_key(&id_for_task) {
                registry.running.insert(
                    id_for_task,
                    RunningLoop {
                        cancel,
                        handle,
                        pause_requested: false,
                    },
                );
            }
        }

        Ok(())
        })
    }

    /// Cooperative stop; waits up to the configured timeout for the loop to
    /// unwind. Returns false on timeout.
    pub async fn stop(&self, session_id: &str) -> Result<bool, SessionError> {
        debug!(%session_id, "SessionManager::stop: called");

        let running = {
            let mut registry = self.registry.write().unwrap();
            if !registry.sessions.contains_key(session_id) {
                return Err(SessionError::NotFound(session_id.to_string()));
            }
            if let Some(session) = registry.sessions.get_mut(session_id)
                && session.state == SessionState::Running
            {
                session.state = SessionState::Stopping;
            }
            registry.running.remove(session_id)
        };

        let Some(running) = running else {
            // No live loop; mark it stopped directly.
            self.mark_state(session_id, SessionState::Stopped).await;
            return Ok(true);
        };

        running.cancel.cancel();
        let timeout = Duration::from_secs(self.config.session.stop_timeout_secs);
        match tokio::time::timeout(timeout, running.handle).await {
            Ok(_) => Ok(true),
            Err(_) => {
                warn!(%session_id, "SessionManager::stop: loop did not unwind in time");
                Ok(false)
            }
        }
    }

    /// Cancel the loop but keep the session paused for a later start
    pub async fn pause(&self, session_id: &str) -> Result<(), SessionError> {
        debug!(%session_id, "SessionManager::pause: called");
        let cancel = {
            let mut registry = self.registry.write().unwrap();
            if !registry.sessions.contains_key(session_id) {
                return Err(SessionError::NotFound(session_id.to_string()));
            }
            match registry.running.get_mut(session_id) {
                Some(running) => {
                    running.pause_requested = true;
                    Some(running.cancel.clone())
                }
                None => None,
            }
        };

        match cancel {
            Some(cancel) => cancel.cancel(),
            None => self.mark_state(session_id, SessionState::Paused).await,
        }
        Ok(())
    }

    /// Read one session (defensive copy)
    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.registry.read().unwrap().sessions.get(session_id).cloned()
    }

    /// Read the session working a task (defensive copy)
    pub fn get_by_task(&self, task_id: &str) -> Option<Session> {
        let registry = self.registry.read().unwrap();
        let session_id = registry.by_task.get(task_id)?;
        registry.sessions.get(session_id).cloned()
    }

    /// All registered sessions (defensive copies)
    pub fn list(&self) -> Vec<Session> {
        self.registry.read().unwrap().sessions.values().cloned().collect()
    }

    /// Sessions currently starting or running
    pub fn active_count(&self) -> usize {
        self.registry
            .read()
            .unwrap()
            .sessions
            .values()
            .filter(|s| matches!(s.state, SessionState::Starting | SessionState::Running))
            .count()
    }

    /// Rehydrate sessions the store marks running or paused, so a process
    /// restart doesn't orphan work. Previously-running sessions come back
    /// paused; a later `start` resumes them from their checkpoint.
    pub async fn load_active_sessions(&self) -> Result<usize, SessionError> {
        debug!("SessionManager::load_active_sessions: called");
        let stored = self.store.list_active_sessions().await?;
        let mut loaded = 0;

        for mut session in stored {
            if session.state == SessionState::Running {
                session.state = SessionState::Paused;
                if let Err(e) = self.store.update_session(session.clone()).await {
                    warn!(error = %e, session_id = %session.id, "load_active_sessions: persist failed");
                }
            }

            self.trackers
                .lock()
                .unwrap()
                .entry(session.task_id.clone())
                .or_default()
                .record_start(session.hat);

            let mut registry = self.registry.write().unwrap();
            registry.by_task.insert(session.task_id.clone(), session.id.clone());
            registry.sessions.insert(session.id.clone(), session);
            loaded += 1;
        }

        info!(loaded, "Rehydrated active sessions");
        Ok(loaded)
    }

    /// Classification and follow-up once a loop returns
    async fn on_loop_finished(self: Arc<Self>, mut session: Session, outcome: LoopOutcome) {
        debug!(session_id = %session.id, reason = %outcome.reason, "SessionManager::on_loop_finished: called");

        let pause_requested = {
            let mut registry = self.registry.write().unwrap();
            registry
                .running
                .remove(&session.id)
                .map(|r| r.pause_requested)
                .unwrap_or(false)
        };

        let state = classify(&outcome.reason, pause_requested);
        session.state = state;
        session.termination_reason = Some(outcome.reason.clone());

        if let Err(e) = self.store.update_session(session.clone()).await {
            warn!(error = %e, "on_loop_finished: session persist failed");
        }
        if let Err(e) = self
            .store
            .update_session_termination(&session.id, state, outcome.reason.clone(), session.quality_gate_attempts)
            .await
        {
            warn!(error = %e, "on_loop_finished: termination persist failed");
        }

        let event_type = match state {
            SessionState::Completed => "session.completed",
            SessionState::Paused => "session.paused",
            SessionState::Stopped => "session.stopped",
            _ => "session.failed",
        };
        self.broadcaster.publish(
            event_type,
            json!({
                "session_id": session.id,
                "task_id": session.task_id,
                "reason": outcome.reason.to_string(),
            }),
        );

        {
            let mut registry = self.registry.write().unwrap();
            if state == SessionState::Paused {
                if let Some(stored) = registry.sessions.get_mut(&session.id) {
                    *stored = session.clone();
                }
            } else {
                registry.sessions.remove(&session.id);
                registry.by_task.remove(&session.task_id);
            }
        }

        match (&outcome.reason, outcome.next_hat) {
            (TerminationReason::HatTransition, Some(next)) => {
                self.drive_transition(&session, next).await;
            }
            (TerminationReason::Completed, _) => {
                if let Err(e) = self.store.update_task_status(&session.task_id, TaskStatus::Completed).await {
                    warn!(error = %e, "on_loop_finished: task status persist failed");
                }
                self.trackers.lock().unwrap().remove(&session.task_id);
                self.spawn_post_terminal(&session).await;
            }
            _ => {}
        }
    }

    /// Consult the tracker and hand the task to the next hat
    async fn drive_transition(self: &Arc<Self>, old: &Session, next: Hat) {
        info!(task_id = %old.task_id, from = %old.hat, to = %next, "SessionManager: driving hat transition");

        let verdict = self
            .trackers
            .lock()
            .unwrap()
            .entry(old.task_id.clone())
            .or_default()
            .record(old.hat, next);

        if let Err(e) = verdict {
            warn!(task_id = %old.task_id, error = %e, "SessionManager: transition loop detected, quarantining task");
            if let Err(e) = self.store.update_task_status(&old.task_id, TaskStatus::Quarantined).await {
                warn!(error = %e, "drive_transition: quarantine persist failed");
            }
            self.trackers.lock().unwrap().remove(&old.task_id);
            self.broadcaster
                .publish("task.updated", json!({ "task_id": old.task_id, "status": "quarantined" }));
            return;
        }

        let task = match self.store.get_task(&old.task_id).await {
            Ok(Some(task)) => task,
            Ok(None) | Err(_) => {
                warn!(task_id = %old.task_id, "drive_transition: task unavailable, dropping transition");
                return;
            }
        };

        // Continuity: the new session starts from the old one's handoff.
        let predecessor_context = match self.store.latest_checkpoint(&old.id).await {
            Ok(Some(record)) => Checkpoint::from_value(record.payload)
                .handoff
                .map(|h| h.to_markdown()),
            _ => None,
        };

        let new_session = match self.create_session(&task, next, &old.worktree).await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "drive_transition: could not create successor session");
                return;
            }
        };

        let with_context = {
            let mut registry = self.registry.write().unwrap();
            if let Some(stored) = registry.sessions.get_mut(&new_session.id) {
                stored.predecessor_context = predecessor_context.clone();
                stored.clone()
            } else {
                new_session.clone()
            }
        };
        if let Err(e) = self.store.update_session(with_context).await {
            warn!(error = %e, "drive_transition: context persist failed");
        }

        if let Err(e) = self.start(&new_session.id).await {
            warn!(error = %e, "drive_transition: successor start failed");
        }
    }

    /// Push, open a PR, and (on success) merge and clean up - non-blocking
    async fn spawn_post_terminal(self: &Arc<Self>, session: &Session) {
        let task = match self.store.get_task(&session.task_id).await {
            Ok(Some(task)) if task.autonomy > 0 => task,
            _ => return,
        };

        let store = self.store.clone();
        let provider = self.provider.clone();
        let auth_token = self.auth_token.clone();
        let worktree = std::path::PathBuf::from(&session.worktree);

        tokio::spawn(async move {
            if let Err(e) = vcs::push(&worktree, &task.branch, auth_token.as_deref()).await {
                warn!(error = %e, task_id = %task.id, "post-terminal: push failed");
                return;
            }

            let Some(provider) = provider else {
                info!(task_id = %task.id, "post-terminal: no provider, leaving branch pushed");
                return;
            };
            let project = match store.get_project(&task.project_id).await {
                Ok(Some(project)) => project,
                _ => {
                    warn!(task_id = %task.id, "post-terminal: project unavailable, skipping PR");
                    return;
                }
            };

            let pr = match provider
                .create_pr(&project.owner, &project.repo, &task.title, &task.description, &task.branch, "main")
                .await
            {
                Ok(pr) => pr,
                Err(e) => {
                    warn!(error = %e, task_id = %task.id, "post-terminal: PR creation failed");
                    return;
                }
            };
            if let Err(e) = store.update_task_pr_number(&task.id, pr.number).await {
                warn!(error = %e, "post-terminal: PR number persist failed");
            }

            match provider.merge_pr(&project.owner, &project.repo, pr.number).await {
                Ok(()) => {
                    info!(task_id = %task.id, pr = pr.number, "post-terminal: merged");
                    if let Err(e) = vcs::remove_worktree(&worktree).await {
                        warn!(error = %e, "post-terminal: worktree cleanup failed");
                    } else if let Err(e) = store.mark_task_worktree_cleaned(&task.id).await {
                        warn!(error = %e, "post-terminal: cleanup flag persist failed");
                    }
                }
                Err(e) => warn!(error = %e, pr = pr.number, "post-terminal: merge failed"),
            }
        });
    }

    async fn mark_state(&self, session_id: &str, state: SessionState) {
        let updated = {
            let mut registry = self.registry.write().unwrap();
            registry.sessions.get_mut(session_id).map(|session| {
                session.state = state;
                session.clone()
            })
        };
        if let Some(session) = updated
            && let Err(e) = self.store.update_session(session).await
        {
            warn!(error = %e, "mark_state: persist failed");
        }
    }
}

/// Map a termination reason (and pause intent) to the final session state
fn classify(reason: &TerminationReason, pause_requested: bool) -> SessionState {
    match reason {
        TerminationReason::Completed | TerminationReason::HatTransition => SessionState::Completed,
        TerminationReason::UserStopped => {
            if pause_requested {
                SessionState::Paused
            } else {
                SessionState::Stopped
            }
        }
        r if r.is_budget() => SessionState::Paused,
        _ => SessionState::Failed,
    }
}
