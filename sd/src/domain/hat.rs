//! Hats - personas with restricted tool sets and pub/sub contracts
//!
//! A hat declares which topics it subscribes to (may activate on) and which
//! it may publish. Transitions between hats are derived entirely from these
//! contracts; there is no separate transition table to keep in sync.

use serde::{Deserialize, Serialize};

use super::event::Topic;

/// The closed set of personas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hat {
    Explorer,
    Planner,
    Designer,
    Creator,
    Critic,
    Editor,
    Resolver,
}

impl Hat {
    /// All hats, in declaration order
    pub const ALL: [Hat; 7] = [
        Hat::Explorer,
        Hat::Planner,
        Hat::Designer,
        Hat::Creator,
        Hat::Critic,
        Hat::Editor,
        Hat::Resolver,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Hat::Explorer => "explorer",
            Hat::Planner => "planner",
            Hat::Designer => "designer",
            Hat::Creator => "creator",
            Hat::Critic => "critic",
            Hat::Editor => "editor",
            Hat::Resolver => "resolver",
        }
    }

    pub fn parse(s: &str) -> Option<Hat> {
        Hat::ALL.iter().find(|h| h.as_str() == s).copied()
    }

    /// Topics this hat activates on
    pub fn subscribes(&self) -> &'static [Topic] {
        match self {
            Hat::Explorer => &[],
            Hat::Planner => &[Topic::TaskStarted],
            Hat::Designer => &[Topic::PlanComplete],
            Hat::Creator => &[
                Topic::PlanComplete,
                Topic::DesignComplete,
                Topic::ReviewRejected,
                Topic::Resolved,
            ],
            Hat::Critic => &[Topic::ImplementationDone],
            Hat::Editor => &[Topic::ReviewApproved],
            Hat::Resolver => &[Topic::TaskBlocked],
        }
    }

    /// Topics this hat may publish
    pub fn publishes(&self) -> &'static [Topic] {
        match self {
            Hat::Explorer => &[Topic::PlanComplete, Topic::DesignComplete, Topic::TaskBlocked],
            Hat::Planner => &[Topic::PlanComplete, Topic::DesignComplete, Topic::TaskBlocked],
            Hat::Designer => &[Topic::DesignComplete, Topic::TaskBlocked],
            Hat::Creator => &[Topic::ImplementationDone, Topic::TaskBlocked],
            Hat::Critic => &[Topic::ReviewApproved, Topic::ReviewRejected, Topic::TaskBlocked],
            Hat::Editor => &[Topic::TaskComplete, Topic::TaskBlocked],
            Hat::Resolver => &[Topic::Resolved, Topic::TaskComplete],
        }
    }

    /// Whether this hat may publish the given topic
    pub fn may_publish(&self, topic: Topic) -> bool {
        self.publishes().contains(&topic)
    }

    /// Fixed tie-break priority when several hats subscribe to one topic.
    /// Lower wins.
    pub fn priority(&self) -> u8 {
        match self {
            Hat::Planner => 0,
            Hat::Designer => 1,
            Hat::Creator => 2,
            Hat::Critic => 3,
            Hat::Editor => 4,
            Hat::Resolver => 5,
            Hat::Explorer => 6,
        }
    }

    /// Continuation reminder appended when the model replied with plain
    /// text and no recognized signal. Each entry enumerates exactly the
    /// `EVENT:` topics the hat may emit.
    pub fn continuation_prompt(&self) -> &'static str {
        match self {
            Hat::Explorer => {
                "Continue exploring. When you have enough context, emit EVENT:plan.complete, \
                 EVENT:design.complete, or EVENT:task.blocked."
            }
            Hat::Planner => {
                "Continue planning. When the plan is ready, emit EVENT:plan.complete or \
                 EVENT:design.complete; if you cannot proceed, emit EVENT:task.blocked."
            }
            Hat::Designer => {
                "Continue the design. When it is ready, emit EVENT:design.complete; if you \
                 cannot proceed, emit EVENT:task.blocked."
            }
            Hat::Creator => {
                "Continue implementing. When the implementation is done and checks pass, emit \
                 EVENT:implementation.done; if you are blocked, emit EVENT:task.blocked."
            }
            Hat::Critic => {
                "Continue the review. Emit EVENT:review.approved or EVENT:review.rejected when \
                 you have a verdict; if you cannot review, emit EVENT:task.blocked."
            }
            Hat::Editor => {
                "Continue finalizing. When every checklist item is handled, emit \
                 EVENT:task.complete; if you are blocked, emit EVENT:task.blocked."
            }
            Hat::Resolver => {
                "Continue resolving the blocker. Emit EVENT:resolved when the blocker is \
                 cleared, or EVENT:task.complete if nothing remains to do."
            }
        }
    }
}

impl std::fmt::Display for Hat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
