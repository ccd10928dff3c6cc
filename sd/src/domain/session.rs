//! Session domain type
//!
//! A session is one persona working one task. The manager exclusively owns
//! the mutable fields; readers outside the manager always get clones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::hat::Hat;
use super::id::generate_id;

/// Session lifecycle state
///
/// Transitions form a DAG with one cycle: `running ↔ paused`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Created,
    Starting,
    Running,
    Paused,
    Stopping,
    Stopped,
    Completed,
    Failed,
}

impl SessionState {
    /// Whether this state allows a (re)start
    pub fn can_start(&self) -> bool {
        matches!(self, SessionState::Created | SessionState::Paused)
    }

    /// Whether this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Completed | SessionState::Failed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Why a session's execution loop ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Task finished with an acknowledged checklist
    Completed,
    /// The loop handed off to another hat; the task continues
    HatTransition,
    /// Iteration budget reached
    MaxIterations,
    /// Token budget reached
    MaxTokens,
    /// Dollar budget reached
    MaxCost,
    /// Wall-clock budget reached
    MaxRuntime,
    /// Operator requested stop
    UserStopped,
    /// Too many consecutive execution failures
    ConsecutiveFailures,
    /// Too many malformed tool inputs or empty responses
    ValidationFailure,
    /// Quality gate attempts exhausted
    QualityGateExhausted,
    /// The model kept repeating the same tool call
    RepetitionLoop,
    /// A checklist item kept bouncing off the quality gate
    LoopThrashing,
    /// Unclassified error, message attached
    Error { message: String },
}

impl TerminationReason {
    /// True only for the two clean exits
    pub fn is_success(&self) -> bool {
        matches!(self, TerminationReason::Completed | TerminationReason::HatTransition)
    }

    /// True for every limit-or-health reason
    pub fn is_exhaustion(&self) -> bool {
        matches!(
            self,
            TerminationReason::MaxIterations
                | TerminationReason::MaxTokens
                | TerminationReason::MaxCost
                | TerminationReason::MaxRuntime
                | TerminationReason::ConsecutiveFailures
                | TerminationReason::ValidationFailure
                | TerminationReason::QualityGateExhausted
                | TerminationReason::RepetitionLoop
                | TerminationReason::LoopThrashing
        )
    }

    /// Budget breaches pause the session rather than failing it
    pub fn is_budget(&self) -> bool {
        matches!(
            self,
            TerminationReason::MaxIterations
                | TerminationReason::MaxTokens
                | TerminationReason::MaxCost
                | TerminationReason::MaxRuntime
        )
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::HatTransition => write!(f, "hat_transition"),
            Self::MaxIterations => write!(f, "max_iterations"),
            Self::MaxTokens => write!(f, "max_tokens"),
            Self::MaxCost => write!(f, "max_cost"),
            Self::MaxRuntime => write!(f, "max_runtime"),
            Self::UserStopped => write!(f, "user_stopped"),
            Self::ConsecutiveFailures => write!(f, "consecutive_failures"),
            Self::ValidationFailure => write!(f, "validation_failure"),
            Self::QualityGateExhausted => write!(f, "quality_gate_exhausted"),
            Self::RepetitionLoop => write!(f, "repetition_loop"),
            Self::LoopThrashing => write!(f, "loop_thrashing"),
            Self::Error { message } => write!(f, "error: {}", message),
        }
    }
}

/// Per-session budget caps
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BudgetCaps {
    /// Maximum loop iterations
    pub max_iterations: u32,

    /// Maximum input+output tokens
    pub max_tokens: u64,

    /// Maximum accumulated cost in USD
    pub max_cost_usd: f64,

    /// Maximum wall-clock seconds
    pub max_runtime_secs: u64,
}

impl Default for BudgetCaps {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            max_tokens: 2_000_000,
            max_cost_usd: 25.0,
            max_runtime_secs: 4 * 60 * 60,
        }
    }
}

/// One persona instance working a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier
    pub id: String,

    /// Task being worked
    pub task_id: String,

    /// Owning project
    pub project_id: String,

    /// Current hat
    pub hat: Hat,

    /// Lifecycle state
    #[serde(default)]
    pub state: SessionState,

    /// Absolute path to the task's worktree
    pub worktree: String,

    /// Iterations completed so far
    #[serde(default)]
    pub iteration: u32,

    /// Accumulated input tokens
    #[serde(default)]
    pub input_tokens: u64,

    /// Accumulated output tokens
    #[serde(default)]
    pub output_tokens: u64,

    /// Budget caps for this session
    #[serde(default)]
    pub budget: BudgetCaps,

    /// When the loop first started
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    /// Last observed loop activity
    #[serde(default)]
    pub last_activity_at: Option<DateTime<Utc>>,

    /// Free-form working notes the model maintains via `SCRATCHPAD:`
    #[serde(default)]
    pub scratchpad: String,

    /// Handoff context inherited from a predecessor session
    #[serde(default)]
    pub predecessor_context: Option<String>,

    /// Why the loop ended, once it has
    #[serde(default)]
    pub termination_reason: Option<TerminationReason>,

    /// Quality-gate attempts observed by the health monitor
    #[serde(default)]
    pub quality_gate_attempts: u32,
}

impl Session {
    /// Create a new session for a task
    pub fn new(task_id: impl Into<String>, project_id: impl Into<String>, hat: Hat, worktree: impl Into<String>) -> Self {
        let task_id = task_id.into();
        Self {
            id: generate_id("sess", hat.as_str()),
            task_id,
            project_id: project_id.into(),
            hat,
            state: SessionState::Created,
            worktree: worktree.into(),
            iteration: 0,
            input_tokens: 0,
            output_tokens: 0,
            budget: BudgetCaps::default(),
            started_at: None,
            last_activity_at: None,
            scratchpad: String::new(),
            predecessor_context: None,
            termination_reason: None,
            quality_gate_attempts: 0,
        }
    }

    /// Builder method to set budget caps
    pub fn with_budget(mut self, budget: BudgetCaps) -> Self {
        self.budget = budget;
        self
    }

    /// Total tokens consumed so far
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Elapsed wall-clock time since start
    pub fn elapsed(&self) -> chrono::Duration {
        match self.started_at {
            Some(started) => Utc::now() - started,
            None => chrono::Duration::zero(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_can_start() {
        assert!(SessionState::Created.can_start());
        assert!(SessionState::Paused.can_start());
        assert!(!SessionState::Running.can_start());
        assert!(!SessionState::Completed.can_start());
    }

    #[test]
    fn test_termination_reason_classification() {
        assert!(TerminationReason::Completed.is_success());
        assert!(TerminationReason::HatTransition.is_success());
        assert!(!TerminationReason::MaxIterations.is_success());

        assert!(TerminationReason::RepetitionLoop.is_exhaustion());
        assert!(TerminationReason::QualityGateExhausted.is_exhaustion());
        assert!(!TerminationReason::Completed.is_exhaustion());
        assert!(!TerminationReason::UserStopped.is_exhaustion());

        assert!(TerminationReason::MaxCost.is_budget());
        assert!(!TerminationReason::ConsecutiveFailures.is_budget());
    }

    #[test]
    fn test_termination_reason_wire_names() {
        assert_eq!(TerminationReason::LoopThrashing.to_string(), "loop_thrashing");
        assert_eq!(
            serde_json::to_value(&TerminationReason::MaxIterations).unwrap(),
            serde_json::json!("max_iterations")
        );
    }

    #[test]
    fn test_new_session_defaults() {
        let session = Session::new("task-1", "proj-1", Hat::Planner, "/tmp/wt");
        assert_eq!(session.state, SessionState::Created);
        assert_eq!(session.iteration, 0);
        assert_eq!(session.total_tokens(), 0);
        assert!(session.id.contains("-sess-"));
    }

    #[test]
    fn test_session_serde_round_trip() {
        let mut session = Session::new("task-1", "proj-1", Hat::Creator, "/tmp/wt");
        session.termination_reason = Some(TerminationReason::Error {
            message: "boom".to_string(),
        });
        let json = serde_json::to_string(&session).unwrap();
        let parsed: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.termination_reason, session.termination_reason);
        assert_eq!(parsed.hat, Hat::Creator);
    }
}
