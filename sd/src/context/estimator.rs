//! Token estimation heuristic
//!
//! Cheap and deterministic: four characters per token for text, plus a
//! fixed 50-token overhead for each structural tool block. Close enough to
//! steer compaction; the real counts come back in API usage fields.

use crate::llm::{ContentBlock, Message, MessageContent};

/// Chars-per-token divisor for plain text
const CHARS_PER_TOKEN: usize = 4;

/// Structural overhead per tool_use / tool_result block
const BLOCK_OVERHEAD: usize = 50;

/// Estimate tokens for a text span
pub fn estimate_text(text: &str) -> usize {
    text.len().div_ceil(CHARS_PER_TOKEN)
}

/// Estimate tokens for one content block
pub fn estimate_block(block: &ContentBlock) -> usize {
    match block {
        ContentBlock::Text { text } => estimate_text(text),
        ContentBlock::ToolUse { name, input, .. } => {
            BLOCK_OVERHEAD + estimate_text(name) + estimate_text(&input.to_string())
        }
        ContentBlock::ToolResult { content, .. } => BLOCK_OVERHEAD + estimate_text(content),
    }
}

/// Estimate tokens for one turn
pub fn estimate_message(message: &Message) -> usize {
    match &message.content {
        MessageContent::Text(text) => estimate_text(text),
        MessageContent::Blocks(blocks) => blocks.iter().map(estimate_block).sum(),
    }
}

/// Estimate tokens for a whole transcript
pub fn estimate_transcript(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message).sum()
}
