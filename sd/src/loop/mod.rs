//! Execution loop
//!
//! One loop per session; the manager spawns and supervises them.

mod engine;

pub use engine::{ExecutionLoop, LoopOutcome};
