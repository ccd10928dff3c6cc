//! Transition tracker
//!
//! Per-task record of the hat sequence. Catches the three ways a task can
//! spin without progress: one edge taken too often, two hats ping-ponging
//! (`A→B→A→B`), and the same hat re-entered three times straight. The
//! manager treats any tracker error as a quarantined task.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::domain::Hat;

/// Default cap on any single `from→to` edge
pub const DEFAULT_MAX_EDGE_COUNT: u32 = 3;

/// Transition loop detection errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Edge {from}→{to} exceeded {limit} transitions")]
    EdgeLimit { from: Hat, to: Hat, limit: u32 },

    #[error("Oscillation detected: {a}→{b}→{a}→{b}")]
    Oscillation { a: Hat, b: Hat },

    #[error("Hat {hat} repeated three times in a row")]
    TripleRepeat { hat: Hat },
}

/// Per-task hat transition history
#[derive(Debug)]
pub struct TransitionTracker {
    max_edge_count: u32,
    sequence: Vec<Hat>,
    edges: HashMap<(Hat, Hat), u32>,
}

impl Default for TransitionTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EDGE_COUNT)
    }
}

impl TransitionTracker {
    pub fn new(max_edge_count: u32) -> Self {
        Self {
            max_edge_count,
            sequence: Vec::new(),
            edges: HashMap::new(),
        }
    }

    /// Record the first hat a task starts with
    pub fn record_start(&mut self, hat: Hat) {
        if self.sequence.is_empty() {
            self.sequence.push(hat);
        }
    }

    /// Record a transition; errors mean the task should be quarantined
    pub fn record(&mut self, from: Hat, to: Hat) -> Result<(), TransitionError> {
        debug!(%from, %to, "TransitionTracker::record: called");
        if self.sequence.is_empty() {
            self.sequence.push(from);
        }
        self.sequence.push(to);

        let count = self.edges.entry((from, to)).or_insert(0);
        *count += 1;
        if *count > self.max_edge_count {
            return Err(TransitionError::EdgeLimit {
                from,
                to,
                limit: self.max_edge_count,
            });
        }

        // A→B→A→B over the last four hats
        if self.sequence.len() >= 4 {
            let tail = &self.sequence[self.sequence.len() - 4..];
            if tail[0] == tail[2] && tail[1] == tail[3] && tail[0] != tail[1] {
                return Err(TransitionError::Oscillation {
                    a: tail[0],
                    b: tail[1],
                });
            }
        }

        // Same hat three times straight
        if self.sequence.len() >= 3 {
            let tail = &self.sequence[self.sequence.len() - 3..];
            if tail[0] == tail[1] && tail[1] == tail[2] {
                return Err(TransitionError::TripleRepeat { hat: tail[0] });
            }
        }

        Ok(())
    }

    /// Hats seen so far, in order
    pub fn sequence(&self) -> &[Hat] {
        &self.sequence
    }

    /// Transitions recorded so far
    pub fn transition_count(&self) -> usize {
        self.sequence.len().saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_pipeline_passes() {
        let mut tracker = TransitionTracker::default();
        tracker.record_start(Hat::Planner);
        tracker.record(Hat::Planner, Hat::Designer).unwrap();
        tracker.record(Hat::Designer, Hat::Creator).unwrap();
        tracker.record(Hat::Creator, Hat::Critic).unwrap();
        tracker.record(Hat::Critic, Hat::Editor).unwrap();
        assert_eq!(tracker.transition_count(), 4);
    }

    #[test]
    fn test_oscillation_detected_on_fourth_hat() {
        let mut tracker = TransitionTracker::default();
        tracker.record_start(Hat::Creator);
        tracker.record(Hat::Creator, Hat::Critic).unwrap();
        tracker.record(Hat::Critic, Hat::Creator).unwrap();
        let err = tracker.record(Hat::Creator, Hat::Critic).unwrap_err();
        assert_eq!(
            err,
            TransitionError::Oscillation {
                a: Hat::Creator,
                b: Hat::Critic
            }
        );
    }

    #[test]
    fn test_rework_cycle_allowed_once() {
        // creator→critic→creator is legitimate rework; only the fourth hat
        // completes the A→B→A→B pattern.
        let mut tracker = TransitionTracker::default();
        tracker.record_start(Hat::Creator);
        tracker.record(Hat::Creator, Hat::Critic).unwrap();
        assert!(tracker.record(Hat::Critic, Hat::Creator).is_ok());
    }

    #[test]
    fn test_triple_repeat_detected() {
        let mut tracker = TransitionTracker::default();
        tracker.record_start(Hat::Resolver);
        tracker.record(Hat::Resolver, Hat::Resolver).unwrap();
        let err = tracker.record(Hat::Resolver, Hat::Resolver).unwrap_err();
        assert_eq!(err, TransitionError::TripleRepeat { hat: Hat::Resolver });
    }

    #[test]
    fn test_edge_limit() {
        let mut tracker = TransitionTracker::new(3);
        tracker.record_start(Hat::Creator);
        for _ in 0..3 {
            tracker.record(Hat::Creator, Hat::Resolver).unwrap();
            // Break the oscillation window with a different edge
            tracker.record(Hat::Resolver, Hat::Planner).unwrap();
            tracker.record(Hat::Planner, Hat::Creator).unwrap();
        }
        let err = tracker.record(Hat::Creator, Hat::Resolver).unwrap_err();
        assert_eq!(
            err,
            TransitionError::EdgeLimit {
                from: Hat::Creator,
                to: Hat::Resolver,
                limit: 3
            }
        );
    }

    #[test]
    fn test_record_without_start_seeds_sequence() {
        let mut tracker = TransitionTracker::default();
        tracker.record(Hat::Planner, Hat::Creator).unwrap();
        assert_eq!(tracker.sequence(), &[Hat::Planner, Hat::Creator]);
    }
}
