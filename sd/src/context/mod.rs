//! Context-window management
//!
//! Token estimation and the compaction guard the execution loop consults at
//! the top of every iteration.

mod estimator;
mod guard;

pub use estimator::{estimate_block, estimate_message, estimate_text, estimate_transcript};
pub use guard::{
    CompactionResult, ContextGuard, ContextThresholds, LlmSummarizer, SUMMARY_HEADER, SummaryTier, Summarizer,
};
