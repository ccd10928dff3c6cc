//! Event routing between hats
//!
//! The router derives handoffs from the hat contracts; the transition
//! tracker catches tasks spinning between hats without progress.

mod router;
mod transition;

pub use router::{EventRouter, RouteError, RouteOutcome};
pub use transition::{DEFAULT_MAX_EDGE_COUNT, TransitionError, TransitionTracker};
