//! Activity records - the durable per-iteration event log
//!
//! Activity is the authoritative record of what a session did; token
//! accounting and the realtime feed both derive from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::hat::Hat;
use super::id::generate_id;

/// What kind of event an activity record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    UserMessage,
    AssistantResponse,
    ToolCall,
    ToolResult,
    Completion,
    HatTransition,
    DebugLog,
    ChecklistUpdate,
    QualityGate,
    LoopHealth,
    Decision,
    MemoryCreated,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::UserMessage => "user_message",
            ActivityKind::AssistantResponse => "assistant_response",
            ActivityKind::ToolCall => "tool_call",
            ActivityKind::ToolResult => "tool_result",
            ActivityKind::Completion => "completion",
            ActivityKind::HatTransition => "hat_transition",
            ActivityKind::DebugLog => "debug_log",
            ActivityKind::ChecklistUpdate => "checklist_update",
            ActivityKind::QualityGate => "quality_gate",
            ActivityKind::LoopHealth => "loop_health",
            ActivityKind::Decision => "decision",
            ActivityKind::MemoryCreated => "memory_created",
        }
    }
}

/// Immutable log entry for one session event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Unique identifier
    pub id: String,

    /// Session the event belongs to
    pub session_id: String,

    /// Iteration during which it was emitted
    pub iteration: u32,

    /// Hat active at the time
    pub hat: Hat,

    /// Event-type tag
    pub kind: ActivityKind,

    /// Structured payload
    pub payload: serde_json::Value,

    /// Input tokens attributed to this event, if any
    #[serde(default)]
    pub input_tokens: Option<u64>,

    /// Output tokens attributed to this event, if any
    #[serde(default)]
    pub output_tokens: Option<u64>,

    /// Emission timestamp
    pub created_at: DateTime<Utc>,
}

impl ActivityRecord {
    pub fn new(
        session_id: impl Into<String>,
        iteration: u32,
        hat: Hat,
        kind: ActivityKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: generate_id("act", kind.as_str()),
            session_id: session_id.into(),
            iteration,
            hat,
            kind,
            payload,
            input_tokens: None,
            output_tokens: None,
            created_at: Utc::now(),
        }
    }

    /// Builder method to attach token counts
    pub fn with_tokens(mut self, input: u64, output: u64) -> Self {
        self.input_tokens = Some(input);
        self.output_tokens = Some(output);
        self
    }
}
