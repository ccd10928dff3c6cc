//! Loop health monitor
//!
//! Tracks failure streaks, validation problems, quality-gate attempts, and
//! repetition, and decides when a session has stopped making progress. All
//! counters live behind one mutex; the loop queries `should_terminate` at
//! the top of every iteration.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;
use tracing::debug;

use crate::domain::TerminationReason;

mod repetition;

pub use repetition::{DEFAULT_MAX_BLOCKS, DEFAULT_MAX_REPETITIONS, RepetitionInspector};

/// Health thresholds
#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
    /// Consecutive tool/LLM execution failures before termination
    pub max_consecutive_failures: u32,
    /// Total quality-gate attempts before exhaustion
    pub max_quality_gate_attempts: u32,
    /// Quality-gate blocks on one checklist item before thrashing
    pub max_item_blocks: u32,
    /// Consecutive malformed tool inputs / empty responses
    pub max_validation_failures: u32,
    /// Identical consecutive tool calls permitted
    pub max_repetitions: u32,
    /// Repetition refusals before termination
    pub max_repetition_blocks: u32,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 5,
            max_quality_gate_attempts: 5,
            max_item_blocks: 3,
            max_validation_failures: 3,
            max_repetitions: DEFAULT_MAX_REPETITIONS,
            max_repetition_blocks: DEFAULT_MAX_BLOCKS,
        }
    }
}

/// Aggregate health state, worst first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Ok,
    /// Some consecutive counter is above zero
    Degraded,
    /// A counter has met its threshold
    Thrashing,
    /// Quality-gate attempts hit the maximum
    Exhausted,
}

#[derive(Debug)]
struct HealthInner {
    consecutive_failures: u32,
    validation_failures: u32,
    quality_gate_blocks: u32,
    quality_gate_attempts: u32,
    item_blocks: HashMap<String, u32>,
    inspector: RepetitionInspector,
}

/// Mutex-guarded health tracker for one session
#[derive(Debug)]
pub struct LoopHealth {
    thresholds: HealthThresholds,
    inner: Mutex<HealthInner>,
}

impl Default for LoopHealth {
    fn default() -> Self {
        Self::new(HealthThresholds::default())
    }
}

impl LoopHealth {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self {
            thresholds,
            inner: Mutex::new(HealthInner {
                consecutive_failures: 0,
                validation_failures: 0,
                quality_gate_blocks: 0,
                quality_gate_attempts: 0,
                item_blocks: HashMap::new(),
                inspector: RepetitionInspector::new(thresholds.max_repetitions, thresholds.max_repetition_blocks),
            }),
        }
    }

    /// A tool or LLM step succeeded
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_failures = 0;
    }

    /// A tool or LLM step failed
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_failures += 1;
        debug!(consecutive_failures = inner.consecutive_failures, "LoopHealth::record_failure");
    }

    /// A well-formed response arrived
    pub fn record_valid_response(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.validation_failures = 0;
    }

    /// Malformed tool input or empty response
    pub fn record_validation_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.validation_failures += 1;
        debug!(validation_failures = inner.validation_failures, "LoopHealth::record_validation_failure");
    }

    /// A quality-gate run finished
    pub fn record_quality_gate(&self, passed: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.quality_gate_attempts += 1;
        if passed {
            inner.quality_gate_blocks = 0;
        } else {
            inner.quality_gate_blocks += 1;
        }
        debug!(
            attempts = inner.quality_gate_attempts,
            blocks = inner.quality_gate_blocks,
            passed,
            "LoopHealth::record_quality_gate"
        );
    }

    /// A quality-gate block attributed to one checklist item
    pub fn record_item_block(&self, item_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        *inner.item_blocks.entry(item_id.to_string()).or_insert(0) += 1;
    }

    /// Consult the repetition inspector; true = the call may proceed
    pub fn check_repetition(&self, tool: &str, params: &Value) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.inspector.check(tool, params)
    }

    /// Reset the repetition streak (hat transition)
    pub fn reset_repetition(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.inspector.reset();
    }

    /// Total quality-gate attempts so far
    pub fn quality_gate_attempts(&self) -> u32 {
        self.inner.lock().unwrap().quality_gate_attempts
    }

    /// Current aggregate state
    pub fn state(&self) -> HealthState {
        let inner = self.inner.lock().unwrap();
        let t = &self.thresholds;

        if inner.quality_gate_attempts >= t.max_quality_gate_attempts {
            return HealthState::Exhausted;
        }

        let thrashing = inner.consecutive_failures >= t.max_consecutive_failures
            || inner.validation_failures >= t.max_validation_failures
            || inner.inspector.should_terminate()
            || inner.item_blocks.values().any(|c| *c >= t.max_item_blocks);
        if thrashing {
            return HealthState::Thrashing;
        }

        let degraded = inner.consecutive_failures > 0
            || inner.validation_failures > 0
            || inner.quality_gate_blocks > 0
            || inner.inspector.block_count() > 0;
        if degraded {
            return HealthState::Degraded;
        }

        HealthState::Ok
    }

    /// First matching termination reason, if any
    ///
    /// Order: quality-gate exhausted, consecutive failures, validation
    /// failures, repetition loop, item-block thrashing.
    pub fn should_terminate(&self) -> Option<TerminationReason> {
        let inner = self.inner.lock().unwrap();
        let t = &self.thresholds;

        if inner.quality_gate_attempts >= t.max_quality_gate_attempts {
            return Some(TerminationReason::QualityGateExhausted);
        }
        if inner.consecutive_failures >= t.max_consecutive_failures {
            return Some(TerminationReason::ConsecutiveFailures);
        }
        if inner.validation_failures >= t.max_validation_failures {
            return Some(TerminationReason::ValidationFailure);
        }
        if inner.inspector.should_terminate() {
            return Some(TerminationReason::RepetitionLoop);
        }
        if inner.item_blocks.values().any(|c| *c >= t.max_item_blocks) {
            return Some(TerminationReason::LoopThrashing);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fresh_health_is_ok() {
        let health = LoopHealth::default();
        assert_eq!(health.state(), HealthState::Ok);
        assert!(health.should_terminate().is_none());
    }

    #[test]
    fn test_failure_streak_degrades_then_thrashes() {
        let health = LoopHealth::default();

        health.record_failure();
        assert_eq!(health.state(), HealthState::Degraded);

        for _ in 0..4 {
            health.record_failure();
        }
        assert_eq!(health.state(), HealthState::Thrashing);
        assert_eq!(health.should_terminate(), Some(TerminationReason::ConsecutiveFailures));
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let health = LoopHealth::default();
        for _ in 0..4 {
            health.record_failure();
        }
        health.record_success();
        health.record_failure();
        assert!(health.should_terminate().is_none());
    }

    #[test]
    fn test_validation_failures_terminate() {
        let health = LoopHealth::default();
        for _ in 0..3 {
            health.record_validation_failure();
        }
        assert_eq!(health.should_terminate(), Some(TerminationReason::ValidationFailure));
    }

    #[test]
    fn test_quality_gate_exhaustion_wins_ordering() {
        let health = LoopHealth::default();
        for _ in 0..5 {
            health.record_quality_gate(false);
            health.record_failure();
        }
        assert_eq!(health.state(), HealthState::Exhausted);
        assert_eq!(health.should_terminate(), Some(TerminationReason::QualityGateExhausted));
        assert_eq!(health.quality_gate_attempts(), 5);
    }

    #[test]
    fn test_repetition_loop_termination() {
        let health = LoopHealth::new(HealthThresholds {
            max_repetitions: 1,
            max_repetition_blocks: 3,
            ..Default::default()
        });
        let params = json!({"path": "x"});

        assert!(health.check_repetition("read_file", &params));
        for _ in 0..3 {
            assert!(!health.check_repetition("read_file", &params));
        }
        assert_eq!(health.should_terminate(), Some(TerminationReason::RepetitionLoop));
    }

    #[test]
    fn test_item_thrashing() {
        let health = LoopHealth::default();
        for _ in 0..3 {
            health.record_item_block("it-1");
        }
        assert_eq!(health.should_terminate(), Some(TerminationReason::LoopThrashing));
    }

    #[test]
    fn test_passing_gate_resets_blocks_not_attempts() {
        let health = LoopHealth::default();
        health.record_quality_gate(false);
        health.record_quality_gate(true);
        assert_eq!(health.quality_gate_attempts(), 2);
        assert!(health.should_terminate().is_none());
    }
}
