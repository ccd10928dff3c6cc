//! Repetition inspector
//!
//! Watches consecutive tool calls for identical `(name, params)` signatures
//! and refuses calls past the limit. Models stuck in a loop re-issue the
//! exact same call; a changed signature resets the streak.

use serde_json::Value;
use tracing::debug;

/// Default identical consecutive calls permitted
pub const DEFAULT_MAX_REPETITIONS: u32 = 5;

/// Default refusals before recommending termination
pub const DEFAULT_MAX_BLOCKS: u32 = 3;

/// Tracks consecutive identical tool calls
#[derive(Debug)]
pub struct RepetitionInspector {
    max_repetitions: u32,
    max_blocks: u32,
    last_signature: Option<String>,
    repeat_count: u32,
    block_count: u32,
}

impl Default for RepetitionInspector {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REPETITIONS, DEFAULT_MAX_BLOCKS)
    }
}

impl RepetitionInspector {
    pub fn new(max_repetitions: u32, max_blocks: u32) -> Self {
        Self {
            max_repetitions,
            max_blocks,
            last_signature: None,
            repeat_count: 0,
            block_count: 0,
        }
    }

    /// Inspect a call; returns true when the call may proceed
    ///
    /// serde_json maps iterate in sorted key order, so identical params
    /// always produce identical signatures.
    pub fn check(&mut self, name: &str, params: &Value) -> bool {
        let signature = format!("{}:{}", name, params);

        if self.last_signature.as_deref() == Some(signature.as_str()) {
            self.repeat_count += 1;
        } else {
            self.last_signature = Some(signature);
            self.repeat_count = 1;
        }

        if self.repeat_count > self.max_repetitions {
            self.block_count += 1;
            debug!(%name, repeat_count = self.repeat_count, block_count = self.block_count, "RepetitionInspector: call blocked");
            return false;
        }
        true
    }

    /// Whether refusals have crossed the termination threshold
    pub fn should_terminate(&self) -> bool {
        self.block_count >= self.max_blocks
    }

    /// Refusals so far
    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    /// Reset the streak (on hat transition)
    pub fn reset(&mut self) {
        debug!("RepetitionInspector::reset: called");
        self.last_signature = None;
        self.repeat_count = 0;
    }
}
