//! Streaming signal parser
//!
//! Consumes incremental text deltas from the LLM stream and surfaces
//! checklist signals the moment their line is complete, so the UI sees
//! progress while the model is still typing. Partial trailing text is
//! retained for the next delta.

use tracing::debug;

use super::{ChecklistSignal, ProcessedSignals, parse_checklist_line};

/// Newline-buffered streaming state machine
#[derive(Debug, Default)]
pub struct StreamingSignalParser {
    buffer: String,
    processed: ProcessedSignals,
}

impl StreamingSignalParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one delta; returns the signals that became complete and fire now
    pub fn push_delta(&mut self, delta: &str) -> Vec<ChecklistSignal> {
        self.buffer.push_str(delta);

        let mut fired = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            if let Some(signal) = parse_checklist_line(line.trim_end())
                && self.processed.admit(&signal)
            {
                debug!(item_id = %signal.item_id, "StreamingSignalParser: signal fired");
                fired.push(signal);
            }
        }
        fired
    }

    /// Flush the trailing partial line at end of stream
    ///
    /// A signal without a trailing newline still counts once the stream is
    /// over; this drains whatever is left in the buffer.
    pub fn finish(&mut self) -> Vec<ChecklistSignal> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let line = std::mem::take(&mut self.buffer);
        let mut fired = Vec::new();
        if let Some(signal) = parse_checklist_line(line.trim_end())
            && self.processed.admit(&signal)
        {
            debug!(item_id = %signal.item_id, "StreamingSignalParser: trailing signal fired");
            fired.push(signal);
        }
        fired
    }

    /// Ids already handled, for the batch parser's skip set
    pub fn processed(&self) -> &ProcessedSignals {
        &self.processed
    }

    /// Hand the processed set to the batch pass
    pub fn take_processed(&mut self) -> ProcessedSignals {
        std::mem::take(&mut self.processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::ChecklistOutcome;

    #[test]
    fn test_signal_split_across_deltas() {
        let mut parser = StreamingSignalParser::new();

        assert!(parser.push_delta("CHECKLIST_").is_empty());
        assert!(parser.push_delta("DONE:it").is_empty());
        let fired = parser.push_delta("-1\nmore text");
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].item_id, "it-1");
    }

    #[test]
    fn test_exactly_once_per_id() {
        let mut parser = StreamingSignalParser::new();
        let first = parser.push_delta("CHECKLIST_DONE:it-1\nCHECKLIST_DONE:it-1\n");
        assert_eq!(first.len(), 1);
        assert!(parser.push_delta("CHECKLIST_DONE:it-1\n").is_empty());
    }

    #[test]
    fn test_failed_after_done_fires() {
        let mut parser = StreamingSignalParser::new();
        assert_eq!(parser.push_delta("CHECKLIST_DONE:it-1\n").len(), 1);
        let fired = parser.push_delta("CHECKLIST_FAILED:it-1:regression\n");
        assert_eq!(fired.len(), 1);
        assert!(matches!(fired[0].outcome, ChecklistOutcome::Failed { .. }));
    }

    #[test]
    fn test_multiple_lines_one_delta() {
        let mut parser = StreamingSignalParser::new();
        let fired = parser.push_delta("CHECKLIST_DONE:a\nprose\nCHECKLIST_DONE:b\n");
        assert_eq!(fired.len(), 2);
    }

    #[test]
    fn test_finish_flushes_trailing_signal() {
        let mut parser = StreamingSignalParser::new();
        assert!(parser.push_delta("CHECKLIST_DONE:tail").is_empty());
        let fired = parser.finish();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].item_id, "tail");
        assert!(parser.finish().is_empty());
    }

    #[test]
    fn test_non_signal_prose_ignored() {
        let mut parser = StreamingSignalParser::new();
        assert!(parser.push_delta("I am working on the checklist now.\n").is_empty());
        assert!(parser.processed().is_empty());
    }
}
