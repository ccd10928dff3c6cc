//! Event topics and persisted event records
//!
//! Topics are a closed set: the in-band `EVENT:<topic>` protocol only
//! recognizes these, and anything else in the model's prose is ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::hat::Hat;
use super::id::generate_id;

/// Closed set of event topics hats may publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    #[serde(rename = "task.started")]
    TaskStarted,
    #[serde(rename = "task.complete")]
    TaskComplete,
    #[serde(rename = "task.blocked")]
    TaskBlocked,
    #[serde(rename = "plan.complete")]
    PlanComplete,
    #[serde(rename = "design.complete")]
    DesignComplete,
    #[serde(rename = "implementation.done")]
    ImplementationDone,
    #[serde(rename = "review.approved")]
    ReviewApproved,
    #[serde(rename = "review.rejected")]
    ReviewRejected,
    #[serde(rename = "resolved")]
    Resolved,
}

impl Topic {
    /// All topics, in declaration order
    pub const ALL: [Topic; 9] = [
        Topic::TaskStarted,
        Topic::TaskComplete,
        Topic::TaskBlocked,
        Topic::PlanComplete,
        Topic::DesignComplete,
        Topic::ImplementationDone,
        Topic::ReviewApproved,
        Topic::ReviewRejected,
        Topic::Resolved,
    ];

    /// Wire name as it appears after `EVENT:`
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::TaskStarted => "task.started",
            Topic::TaskComplete => "task.complete",
            Topic::TaskBlocked => "task.blocked",
            Topic::PlanComplete => "plan.complete",
            Topic::DesignComplete => "design.complete",
            Topic::ImplementationDone => "implementation.done",
            Topic::ReviewApproved => "review.approved",
            Topic::ReviewRejected => "review.rejected",
            Topic::Resolved => "resolved",
        }
    }

    /// Parse a wire name; unknown topics return None
    pub fn parse(s: &str) -> Option<Topic> {
        Topic::ALL.iter().find(|t| t.as_str() == s).copied()
    }

    /// Terminal topics end the session instead of routing to another hat
    pub fn is_terminal(&self) -> bool {
        matches!(self, Topic::TaskComplete)
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted, append-only event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique identifier
    pub id: String,

    /// Session that emitted the event
    pub session_id: String,

    /// Topic from the closed set
    pub topic: Topic,

    /// Optional JSON payload carried after the topic
    #[serde(default)]
    pub payload: Option<serde_json::Value>,

    /// Hat that was active when the event was emitted
    pub source_hat: Hat,

    /// Emission timestamp
    pub created_at: DateTime<Utc>,
}

impl EventRecord {
    /// Create a new event record with a generated ID
    pub fn new(session_id: impl Into<String>, topic: Topic, source_hat: Hat) -> Self {
        Self {
            id: generate_id("event", topic.as_str()),
            session_id: session_id.into(),
            topic,
            payload: None,
            source_hat,
            created_at: Utc::now(),
        }
    }

    /// Builder method to attach a payload
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_parse_round_trip() {
        for topic in Topic::ALL {
            assert_eq!(Topic::parse(topic.as_str()), Some(topic));
        }
    }

    #[test]
    fn test_topic_parse_unknown() {
        assert_eq!(Topic::parse("task.destroy"), None);
        assert_eq!(Topic::parse(""), None);
    }

    #[test]
    fn test_only_task_complete_is_terminal() {
        for topic in Topic::ALL {
            assert_eq!(topic.is_terminal(), topic == Topic::TaskComplete);
        }
    }

    #[test]
    fn test_event_record_serde() {
        let record = EventRecord::new("sess-1", Topic::PlanComplete, Hat::Planner)
            .with_payload(serde_json::json!({"phase": 2}));
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("plan.complete"));

        let parsed: EventRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.topic, Topic::PlanComplete);
        assert_eq!(parsed.payload.unwrap()["phase"], 2);
    }
}
