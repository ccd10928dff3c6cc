//! Memory domain type
//!
//! Persistent annotations a project accumulates across tasks. Created only
//! by `MEMORY:<type>:<content>` signals during a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::hat::Hat;
use super::id::generate_id;

/// Closed set of memory types the signal parser accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Architecture,
    Pattern,
    Pitfall,
    Decision,
    Fix,
    Convention,
    Dependency,
    Constraint,
}

impl MemoryType {
    pub const ALL: [MemoryType; 8] = [
        MemoryType::Architecture,
        MemoryType::Pattern,
        MemoryType::Pitfall,
        MemoryType::Decision,
        MemoryType::Fix,
        MemoryType::Convention,
        MemoryType::Dependency,
        MemoryType::Constraint,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Architecture => "architecture",
            MemoryType::Pattern => "pattern",
            MemoryType::Pitfall => "pitfall",
            MemoryType::Decision => "decision",
            MemoryType::Fix => "fix",
            MemoryType::Convention => "convention",
            MemoryType::Dependency => "dependency",
            MemoryType::Constraint => "constraint",
        }
    }

    pub fn parse(s: &str) -> Option<MemoryType> {
        MemoryType::ALL.iter().find(|t| t.as_str() == s).copied()
    }
}

/// How a memory came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemorySource {
    /// The model explicitly emitted a MEMORY: signal
    #[default]
    Explicit,
    /// Derived automatically
    Automatic,
}

/// A persistent project annotation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Unique identifier
    pub id: String,

    /// Owning project
    pub project_id: String,

    /// Memory type
    pub kind: MemoryType,

    /// First sentence of the content, clipped to 100 chars
    pub title: String,

    /// Sanitized content
    pub content: String,

    /// Confidence score in [0, 1]
    pub confidence: f64,

    /// Explicit or automatic
    #[serde(default)]
    pub source: MemorySource,

    /// Hat that created the memory
    pub hat: Hat,

    /// Task in which it was created
    pub task_id: String,

    /// Session in which it was created
    pub session_id: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Derive a memory title: first sentence, clipped to 100 chars
pub fn derive_title(content: &str) -> String {
    let first = content
        .split_inclusive(['.', '\n'])
        .next()
        .unwrap_or(content)
        .trim_end_matches(['.', '\n'])
        .trim();
    let mut title: String = first.chars().take(100).collect();
    if title.is_empty() {
        title = content.chars().take(100).collect();
    }
    title
}

impl Memory {
    /// Create a memory with provenance
    pub fn new(
        project_id: impl Into<String>,
        kind: MemoryType,
        content: impl Into<String>,
        hat: Hat,
        task_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        let content = content.into();
        let title = derive_title(&content);
        Self {
            id: generate_id("mem", &title),
            project_id: project_id.into(),
            kind,
            title,
            content,
            confidence: 0.8,
            source: MemorySource::Explicit,
            hat,
            task_id: task_id.into(),
            session_id: session_id.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_type_parse() {
        assert_eq!(MemoryType::parse("pitfall"), Some(MemoryType::Pitfall));
        assert_eq!(MemoryType::parse("gossip"), None);
    }

    #[test]
    fn test_derive_title_first_sentence() {
        assert_eq!(derive_title("Use tokio broadcast. It drops on lag."), "Use tokio broadcast");
        assert_eq!(derive_title("line one\nline two"), "line one");
    }

    #[test]
    fn test_derive_title_clips_at_100() {
        let long = "x".repeat(300);
        assert_eq!(derive_title(&long).len(), 100);
    }

    #[test]
    fn test_memory_provenance() {
        let mem = Memory::new("proj-1", MemoryType::Decision, "Chose SSE over WS.", Hat::Creator, "task-1", "sess-1");
        assert_eq!(mem.hat, Hat::Creator);
        assert_eq!(mem.source, MemorySource::Explicit);
        assert_eq!(mem.title, "Chose SSE over WS");
    }
}
