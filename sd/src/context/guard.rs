//! Context-window guard and progressive compaction
//!
//! Keeps the rolling transcript under a configured fraction of the model's
//! context window without losing durable meaning. Eviction works on tool
//! exchanges (an assistant `tool_use` turn and its answering `tool_result`
//! turn evict together so no orphaned tool_use survives), removed from the
//! middle outward so the task framing at the head and the recent work at
//! the tail are both preserved.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::llm::{CompletionRequest, LlmClient, LlmError, Message};

use super::estimator::estimate_transcript;

/// Title line of the synthetic summary turn
pub const SUMMARY_HEADER: &str = "## Compacted Context Summary";

/// Progressive removal levels, fractions of the eviction units
const LEVELS: [f64; 4] = [0.30, 0.50, 0.70, 1.00];

/// Turns kept verbatim by the keep-recent fallback
const KEEP_RECENT: usize = 6;

/// Summarization tier for removed turns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryTier {
    /// Haiku-class model
    Cheap,
    /// Sonnet-class model, for heavier removals
    Deep,
}

/// Summarizes evicted turns into a short digest
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, turns: &[Message], tier: SummaryTier) -> Result<String, LlmError>;
}

/// Summarizer backed by an LLM client with per-tier model overrides
pub struct LlmSummarizer {
    llm: Arc<dyn LlmClient>,
    cheap_model: String,
    deep_model: String,
}

impl LlmSummarizer {
    pub fn new(llm: Arc<dyn LlmClient>, cheap_model: impl Into<String>, deep_model: impl Into<String>) -> Self {
        Self {
            llm,
            cheap_model: cheap_model.into(),
            deep_model: deep_model.into(),
        }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, turns: &[Message], tier: SummaryTier) -> Result<String, LlmError> {
        let model = match tier {
            SummaryTier::Cheap => self.cheap_model.clone(),
            SummaryTier::Deep => self.deep_model.clone(),
        };

        let mut digest = String::new();
        for turn in turns {
            let text = turn.text();
            if !text.is_empty() {
                digest.push_str(&text);
                digest.push('\n');
            }
        }

        let request = CompletionRequest {
            system_prompt: "Summarize this agent conversation excerpt. Keep decisions, file paths, \
                            command outcomes, and open problems. Be terse; omit pleasantries."
                .to_string(),
            messages: vec![Message::user(digest)],
            tools: vec![],
            max_tokens: 1024,
            model: Some(model),
        };

        let response = self.llm.complete(request).await?;
        response
            .content
            .ok_or_else(|| LlmError::InvalidResponse("empty summary".to_string()))
    }
}

/// Thresholds as fractions of the context window
#[derive(Debug, Clone, Copy)]
pub struct ContextThresholds {
    /// Model context window in tokens
    pub window: usize,
    /// Log a warning above this
    pub warn_ratio: f64,
    /// Compact above this
    pub compact_ratio: f64,
    /// Compaction aims at or below this
    pub target_ratio: f64,
}

impl Default for ContextThresholds {
    fn default() -> Self {
        Self {
            window: 200_000,
            warn_ratio: 0.40,
            compact_ratio: 0.50,
            target_ratio: 0.35,
        }
    }
}

/// Result of one compaction
#[derive(Debug)]
pub struct CompactionResult {
    /// Replacement transcript
    pub transcript: Vec<Message>,
    /// Removal level that was applied (fraction of eviction units)
    pub level: f64,
    /// Number of tool exchanges evicted
    pub removed_units: usize,
    /// Whether the keep-recent fallback was used
    pub fell_back: bool,
}

/// Context-window guard
pub struct ContextGuard {
    thresholds: ContextThresholds,
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl ContextGuard {
    pub fn new(thresholds: ContextThresholds) -> Self {
        Self {
            thresholds,
            summarizer: None,
        }
    }

    /// Builder method to attach an LLM summarizer
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Current usage as a fraction of the window
    pub fn usage_ratio(&self, transcript: &[Message]) -> f64 {
        estimate_transcript(transcript) as f64 / self.thresholds.window as f64
    }

    /// Whether the loop should switch to the minimal continuation prompt
    pub fn above_target(&self, transcript: &[Message]) -> bool {
        self.usage_ratio(transcript) > self.thresholds.target_ratio
    }

    /// Compact the transcript if usage is above the compact threshold
    ///
    /// Never returns an error: summarizer failures fall through to the
    /// rule-based digest.
    pub async fn check_and_compact(&self, transcript: &[Message], scratchpad: &str) -> Option<CompactionResult> {
        let ratio = self.usage_ratio(transcript);
        if ratio > self.thresholds.warn_ratio && ratio <= self.thresholds.compact_ratio {
            warn!(ratio, "context usage above warn threshold");
        }
        if ratio <= self.thresholds.compact_ratio {
            return None;
        }

        debug!(ratio, turns = transcript.len(), "check_and_compact: compacting");
        let target = (self.thresholds.window as f64 * self.thresholds.target_ratio) as usize;
        let units = eviction_units(transcript);

        if !units.is_empty() {
            for level in LEVELS {
                let remove_count = ((units.len() as f64 * level).ceil() as usize).min(units.len());
                let chosen = middle_out(&units, remove_count);
                let (kept, removed) = split_transcript(transcript, &chosen);

                if estimate_transcript(&kept) <= target {
                    debug!(level, removed_units = remove_count, "check_and_compact: level sufficient");
                    let mut result = kept;
                    if level >= 0.50 {
                        let tier = if level >= 0.70 { SummaryTier::Deep } else { SummaryTier::Cheap };
                        let summary = self.summarize_or_digest(&removed, tier).await;
                        result.insert(0, summary_turn(&summary));
                    }
                    return Some(CompactionResult {
                        transcript: result,
                        level,
                        removed_units: remove_count,
                        fell_back: false,
                    });
                }
            }
        }

        // Even 100% eviction left us over target: keep the recent tail and
        // fold everything else into one synthetic turn.
        Some(self.keep_recent_with_summary(transcript, scratchpad).await)
    }

    async fn keep_recent_with_summary(&self, transcript: &[Message], scratchpad: &str) -> CompactionResult {
        let split = transcript.len().saturating_sub(KEEP_RECENT);
        let (dropped, kept) = transcript.split_at(split);
        let mut kept: Vec<Message> = kept.to_vec();

        // Never keep an orphaned tool_result at the head of the tail
        while kept.first().is_some_and(|m| m.has_tool_result()) {
            kept.remove(0);
        }

        let summary = self.summarize_or_digest(dropped, SummaryTier::Cheap).await;

        let mut intro = String::new();
        intro.push_str(SUMMARY_HEADER);
        intro.push_str("\n\n");
        if !scratchpad.is_empty() {
            intro.push_str("Scratchpad:\n");
            intro.push_str(scratchpad);
            intro.push_str("\n\n");
        }
        intro.push_str(&summary);
        intro.push_str("\n\nContinue the task from this state.");

        let removed_units = dropped.iter().filter(|m| m.has_tool_result()).count();
        let mut result = vec![Message::user(intro)];
        result.extend(kept);

        CompactionResult {
            transcript: result,
            level: 1.0,
            removed_units,
            fell_back: true,
        }
    }

    async fn summarize_or_digest(&self, removed: &[Message], tier: SummaryTier) -> String {
        if let Some(summarizer) = &self.summarizer {
            match summarizer.summarize(removed, tier).await {
                Ok(summary) => return summary,
                Err(e) => warn!(error = %e, "summarizer failed, using rule-based digest"),
            }
        }
        rule_based_digest(removed)
    }
}

/// Build the synthetic summary turn
fn summary_turn(summary: &str) -> Message {
    Message::user(format!("{}\n\n{}", SUMMARY_HEADER, summary))
}

/// One evictable span of transcript indices (inclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Unit {
    start: usize,
    end: usize,
}

/// Identify tool exchanges: each `tool_result` turn plus the assistant
/// `tool_use` turn that provoked it.
fn eviction_units(transcript: &[Message]) -> Vec<Unit> {
    let mut units = Vec::new();
    for (i, message) in transcript.iter().enumerate() {
        if !message.has_tool_result() {
            continue;
        }
        let start = if i > 0 && transcript[i - 1].has_tool_use() { i - 1 } else { i };
        units.push(Unit { start, end: i });
    }
    units
}

/// Pick `count` units, middle outward
fn middle_out(units: &[Unit], count: usize) -> Vec<Unit> {
    let center = (units.len().saturating_sub(1)) as f64 / 2.0;
    let mut order: Vec<usize> = (0..units.len()).collect();
    order.sort_by(|a, b| {
        let da = (*a as f64 - center).abs();
        let db = (*b as f64 - center).abs();
        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut chosen: Vec<Unit> = order.into_iter().take(count).map(|i| units[i]).collect();
    chosen.sort_by_key(|u| u.start);
    chosen
}

/// Split the transcript into (kept, removed) around the chosen units
fn split_transcript(transcript: &[Message], chosen: &[Unit]) -> (Vec<Message>, Vec<Message>) {
    let mut evict = vec![false; transcript.len()];
    for unit in chosen {
        for slot in evict.iter_mut().take(unit.end + 1).skip(unit.start) {
            *slot = true;
        }
    }

    let mut kept = Vec::new();
    let mut removed = Vec::new();
    for (i, message) in transcript.iter().enumerate() {
        if evict[i] {
            removed.push(message.clone());
        } else {
            kept.push(message.clone());
        }
    }
    (kept, removed)
}

/// Rule-based digest of removed turns: decisions and quality-gate outcomes
fn rule_based_digest(removed: &[Message]) -> String {
    let mut lines = Vec::new();
    for message in removed {
        for line in message.text().lines() {
            let lower = line.to_lowercase();
            if lower.contains("quality_passed")
                || lower.contains("quality_blocked")
                || lower.contains("decided")
                || lower.contains("decision")
            {
                lines.push(line.trim().to_string());
            }
        }
    }
    lines.dedup();
    lines.truncate(20);

    let tool_turns = removed.iter().filter(|m| m.has_tool_result()).count();
    let mut digest = format!(
        "Compacted {} earlier turns ({} tool exchanges).",
        removed.len(),
        tool_turns
    );
    if !lines.is_empty() {
        digest.push_str("\nNotable outcomes:\n");
        for line in &lines {
            digest.push_str("- ");
            digest.push_str(line);
            digest.push('\n');
        }
    }
    digest
}
