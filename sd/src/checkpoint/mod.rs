//! Checkpoint serialization and restore
//!
//! A checkpoint is the full recoverable state of a session: iteration,
//! token counters, hat, transcript, scratchpad, optional failure context,
//! and a derived handoff summary. Encoded as forward-compatible JSON:
//! unknown fields are ignored on restore, and the legacy single
//! `tokens_used` counter is approximated as 2/3 input, 1/3 output.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::Hat;
use crate::llm::{ContentBlock, Message, MessageContent};
use crate::signals::sanitize;

mod handoff;

pub use handoff::{HandoffSummary, extract_key_decisions};

/// Marker that opens every synthetic restore turn
pub const RESUME_MARKER: &str = "Resuming Session";

/// How far back the restore guard looks for an existing resume turn
const RESUME_GUARD_WINDOW: usize = 3;

/// Where a failure happened and how to recover
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureContext {
    pub last_error: String,
    pub failed_at: String,
    pub recovery_hint: String,
}

/// Serialized session state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Checkpoint {
    pub iteration: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,

    /// Hat name; kept as a string so an unknown hat on restore degrades to
    /// the current session hat instead of failing.
    pub hat: String,

    pub transcript: Vec<Message>,
    pub scratchpad: String,
    pub failure: Option<FailureContext>,
    pub handoff: Option<HandoffSummary>,

    /// Pre-split token counter from old checkpoints
    #[serde(rename = "tokens_used", skip_serializing_if = "Option::is_none")]
    pub legacy_tokens_used: Option<u64>,
}

impl Checkpoint {
    /// Parsed hat, if the stored name is still known
    pub fn hat(&self) -> Option<Hat> {
        Hat::parse(&self.hat)
    }

    /// Encode to the opaque JSON blob the store keeps
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
    }

    /// Decode from a stored blob
    ///
    /// Total over malformed input: a blob that does not parse yields a
    /// default checkpoint rather than an error, so one bad record cannot
    /// wedge a restore. Legacy `tokens_used` is split 2:1 input:output.
    pub fn from_value(value: serde_json::Value) -> Self {
        let mut checkpoint: Checkpoint = match serde_json::from_value(value) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Checkpoint::from_value: unparseable blob, starting fresh");
                Checkpoint::default()
            }
        };

        if checkpoint.input_tokens == 0
            && checkpoint.output_tokens == 0
            && let Some(total) = checkpoint.legacy_tokens_used
        {
            warn!(total, "Checkpoint::from_value: splitting legacy tokens_used 2:1");
            checkpoint.input_tokens = total * 2 / 3;
            checkpoint.output_tokens = total - checkpoint.input_tokens;
        }

        checkpoint
    }

    /// Rebuild the transcript for resumption
    ///
    /// Every turn is sanitized for prompt injection. When the checkpoint
    /// carries a handoff or failure context, one synthetic `user` turn is
    /// appended combining them - unless one of the last three turns already
    /// begins with the resume marker, which prevents restart-context
    /// stacking across repeated crashes.
    pub fn restore_transcript(&self) -> Vec<Message> {
        debug!(turns = self.transcript.len(), "Checkpoint::restore_transcript: called");
        let mut transcript: Vec<Message> = self.transcript.iter().map(sanitize_message).collect();

        if self.handoff.is_none() && self.failure.is_none() {
            return transcript;
        }

        let already_resumed = transcript
            .iter()
            .rev()
            .take(RESUME_GUARD_WINDOW)
            .any(|m| m.text().starts_with(RESUME_MARKER));
        if already_resumed {
            debug!("Checkpoint::restore_transcript: resume turn already present, not stacking");
            return transcript;
        }

        transcript.push(Message::user(self.resume_turn()));
        transcript
    }

    /// Compose the synthetic resume turn
    fn resume_turn(&self) -> String {
        let mut text = format!("{} at iteration {}.\n", RESUME_MARKER, self.iteration);

        if let Some(handoff) = &self.handoff {
            text.push('\n');
            text.push_str(&handoff.to_markdown());
        }
        if let Some(failure) = &self.failure {
            text.push_str(&format!(
                "\nThe previous run failed at {}: {}\nRecovery hint: {}\n",
                failure.failed_at, failure.last_error, failure.recovery_hint
            ));
        }

        text
    }
}

/// Sanitize one transcript turn
fn sanitize_message(message: &Message) -> Message {
    let content = match &message.content {
        MessageContent::Text(text) => MessageContent::Text(sanitize(text)),
        MessageContent::Blocks(blocks) => MessageContent::Blocks(
            blocks
                .iter()
                .map(|block| match block {
                    ContentBlock::Text { text } => ContentBlock::Text { text: sanitize(text) },
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    } => ContentBlock::ToolResult {
                        tool_use_id: tool_use_id.clone(),
                        content: sanitize(content),
                        is_error: *is_error,
                    },
                    tool_use @ ContentBlock::ToolUse { .. } => tool_use.clone(),
                })
                .collect(),
        ),
    };
    Message {
        role: message.role,
        content,
    }
}
