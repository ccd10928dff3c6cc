//! In-band signal protocol
//!
//! Signals are prose conventions, not structured fields: the model types
//! `CHECKLIST_DONE:<id>`, `SCRATCHPAD:`, `MEMORY:<type>:<content>`, and
//! `EVENT:<topic>` straight into its responses. The streaming parser fires
//! checklist callbacks while the response is still being generated; the
//! batch parser handles everything else once the turn is complete.

use std::collections::HashMap;

mod batch;
mod event;
mod sanitize;
mod streaming;

pub use batch::{BatchSignals, MemorySignal, parse_batch};
pub use event::{ParsedEvent, has_task_complete, parse_event, parse_events};
pub use sanitize::sanitize;
pub use streaming::StreamingSignalParser;

/// Protocol markers that terminate a `SCRATCHPAD:` capture
pub(crate) const MARKERS: [&str; 3] = ["EVENT:", "CHECKLIST_DONE:", "CHECKLIST_FAILED:"];

/// Marker required to complete a task with non-done checklist items
pub const ACKNOWLEDGE_FAILURES: &str = "ACKNOWLEDGE_FAILURES";

/// Outcome a checklist signal reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecklistOutcome {
    Done,
    Failed { reason: String },
}

/// One parsed checklist signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecklistSignal {
    pub item_id: String,
    pub outcome: ChecklistOutcome,
}

/// Exactly-once tracking for checklist signals
///
/// Per item id: the first signal fires; a `failed` may override an earlier
/// `done` (and fires), but a `done` never overrides a `failed`, and repeats
/// of the same outcome never fire twice.
#[derive(Debug, Default, Clone)]
pub struct ProcessedSignals {
    seen: HashMap<String, bool>, // id -> has_failed
}

impl ProcessedSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a signal; returns true when it should fire
    pub fn admit(&mut self, signal: &ChecklistSignal) -> bool {
        let failing = matches!(signal.outcome, ChecklistOutcome::Failed { .. });
        match self.seen.get(&signal.item_id) {
            None => {
                self.seen.insert(signal.item_id.clone(), failing);
                true
            }
            Some(false) if failing => {
                self.seen.insert(signal.item_id.clone(), true);
                true
            }
            Some(_) => false,
        }
    }

    /// Whether any signal for this id was admitted already
    pub fn contains(&self, item_id: &str) -> bool {
        self.seen.contains_key(item_id)
    }

    /// Number of distinct ids seen
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Find every occurrence of `marker` and return the rest of each line
///
/// Idempotent under concatenation of non-signal prose: padding arbitrary
/// text between markers does not change the output.
pub fn find_all_signals(text: &str, marker: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in text.lines() {
        let mut rest = line;
        while let Some(pos) = rest.find(marker) {
            let after = &rest[pos + marker.len()..];
            out.push(after.to_string());
            rest = after;
        }
    }
    out
}

/// Parse one line for a checklist signal
pub(crate) fn parse_checklist_line(line: &str) -> Option<ChecklistSignal> {
    if let Some(pos) = line.find("CHECKLIST_FAILED:") {
        let rest = &line[pos + "CHECKLIST_FAILED:".len()..];
        let (id, reason) = match rest.split_once(':') {
            Some((id, reason)) => (id.trim(), reason.trim().to_string()),
            None => (rest.trim(), String::new()),
        };
        if id.is_empty() {
            return None;
        }
        return Some(ChecklistSignal {
            item_id: id.to_string(),
            outcome: ChecklistOutcome::Failed { reason },
        });
    }

    if let Some(pos) = line.find("CHECKLIST_DONE:") {
        let rest = &line[pos + "CHECKLIST_DONE:".len()..];
        let id = rest.split_whitespace().next().unwrap_or("").trim_matches(':');
        if id.is_empty() {
            return None;
        }
        return Some(ChecklistSignal {
            item_id: id.to_string(),
            outcome: ChecklistOutcome::Done,
        });
    }

    None
}
