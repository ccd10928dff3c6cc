//! Handoff summary generation
//!
//! Produced at every checkpoint so a human or the next hat can resume
//! without reading the full transcript: progress counts, remaining items,
//! key decisions scraped from the scratchpad, and a short continuation
//! prompt.

use serde::{Deserialize, Serialize};

use crate::domain::{Checklist, Hat, ItemStatus};

/// Structured handoff summary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoffSummary {
    pub task_title: String,
    pub current_hat: String,
    pub branch: String,
    pub completed_items: Vec<String>,
    pub remaining_items: Vec<String>,
    pub blocking_issues: Vec<String>,
    pub key_decisions: Vec<String>,
    pub continuation_prompt: String,
}

impl HandoffSummary {
    /// Build a handoff from the current task state
    pub fn build(task_title: &str, hat: Hat, branch: &str, checklist: Option<&Checklist>, scratchpad: &str) -> Self {
        let mut completed = Vec::new();
        let mut remaining = Vec::new();
        let mut blocking = Vec::new();

        if let Some(list) = checklist {
            for item in &list.items {
                match item.status {
                    ItemStatus::Done => completed.push(item.description.clone()),
                    ItemStatus::Pending => remaining.push(item.description.clone()),
                    ItemStatus::Failed => {
                        let issue = if item.notes.is_empty() {
                            item.description.clone()
                        } else {
                            format!("{} ({})", item.description, item.notes)
                        };
                        remaining.push(item.description.clone());
                        blocking.push(issue);
                    }
                }
            }
        }

        let next_step = remaining
            .first()
            .cloned()
            .unwrap_or_else(|| "wrap up and emit the completion event".to_string());

        let continuation_prompt = format!(
            "Continue working on: {}\nCurrent phase: {}\nNext step: {}",
            task_title, hat, next_step
        );

        Self {
            task_title: task_title.to_string(),
            current_hat: hat.as_str().to_string(),
            branch: branch.to_string(),
            completed_items: completed,
            remaining_items: remaining,
            blocking_issues: blocking,
            key_decisions: extract_key_decisions(scratchpad),
            continuation_prompt,
        }
    }

    /// Formatted-markdown form for logs
    pub fn to_markdown(&self) -> String {
        let mut out = format!(
            "## Handoff: {}\n\nHat: {}  \nBranch: {}\n\n",
            self.task_title, self.current_hat, self.branch
        );

        out.push_str(&format!(
            "Progress: {} done, {} remaining\n",
            self.completed_items.len(),
            self.remaining_items.len()
        ));

        if !self.remaining_items.is_empty() {
            out.push_str("\n### Remaining\n");
            for item in &self.remaining_items {
                out.push_str(&format!("- {}\n", item));
            }
        }
        if !self.blocking_issues.is_empty() {
            out.push_str("\n### Blocking\n");
            for issue in &self.blocking_issues {
                out.push_str(&format!("- {}\n", issue));
            }
        }
        if !self.key_decisions.is_empty() {
            out.push_str("\n### Key Decisions\n");
            for decision in &self.key_decisions {
                out.push_str(&format!("- {}\n", decision));
            }
        }

        out.push_str(&format!("\n{}\n", self.continuation_prompt));
        out
    }
}

/// Section-aware scanner for "Key Decisions" bullets in the scratchpad
pub fn extract_key_decisions(scratchpad: &str) -> Vec<String> {
    let mut decisions = Vec::new();
    let mut in_section = false;

    for line in scratchpad.lines() {
        let trimmed = line.trim();

        if is_heading(trimmed) {
            let lower = trimmed.to_lowercase();
            in_section = lower.contains("key decisions") || lower.contains("decisions");
            continue;
        }

        if in_section {
            if let Some(bullet) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
                decisions.push(bullet.trim().to_string());
            } else if !trimmed.is_empty() {
                // Non-bullet prose ends the section
                in_section = false;
            }
        }
    }

    decisions
}

fn is_heading(line: &str) -> bool {
    line.starts_with('#') || (line.ends_with(':') && !line.starts_with('-') && !line.starts_with('*'))
}
