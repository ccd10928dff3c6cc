//! Event router
//!
//! Turns a recognized `EVENT:<topic>` from the current hat into either task
//! completion or a handoff to the next hat. Routing is derived entirely
//! from the hat contracts: publisher validation first, terminal topics
//! short-circuit, and subscriber ties break on fixed hat priority.

use thiserror::Error;
use tracing::debug;

use crate::domain::{Hat, Topic};

/// Routing errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("Hat {hat} may not publish {topic}")]
    Unpublishable { hat: Hat, topic: Topic },

    #[error("No subscriber for {topic}")]
    NoSubscriber { topic: Topic },
}

/// Where an event leads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The session ends; the task is complete
    Terminal,
    /// Another hat takes over the task
    NextHat(Hat),
}

/// Stateless router over the hat contracts
#[derive(Debug, Default, Clone, Copy)]
pub struct EventRouter;

impl EventRouter {
    pub fn new() -> Self {
        Self
    }

    /// Route one event from the current hat
    pub fn route(&self, from: Hat, topic: Topic) -> Result<RouteOutcome, RouteError> {
        debug!(%from, %topic, "EventRouter::route: called");

        if !from.may_publish(topic) {
            return Err(RouteError::Unpublishable { hat: from, topic });
        }

        if topic.is_terminal() {
            debug!(%topic, "EventRouter::route: terminal");
            return Ok(RouteOutcome::Terminal);
        }

        let next = Hat::ALL
            .iter()
            .filter(|hat| hat.subscribes().contains(&topic))
            .min_by_key(|hat| hat.priority())
            .copied()
            .ok_or(RouteError::NoSubscriber { topic })?;

        debug!(%next, "EventRouter::route: handing off");
        Ok(RouteOutcome::NextHat(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_task_complete_from_editor() {
        let router = EventRouter::new();
        assert_eq!(router.route(Hat::Editor, Topic::TaskComplete), Ok(RouteOutcome::Terminal));
    }

    #[test]
    fn test_unpublishable_topic_rejected() {
        let router = EventRouter::new();
        assert_eq!(
            router.route(Hat::Creator, Topic::TaskComplete),
            Err(RouteError::Unpublishable {
                hat: Hat::Creator,
                topic: Topic::TaskComplete
            })
        );
    }

    #[test]
    fn test_implementation_done_routes_to_critic() {
        let router = EventRouter::new();
        assert_eq!(
            router.route(Hat::Creator, Topic::ImplementationDone),
            Ok(RouteOutcome::NextHat(Hat::Critic))
        );
    }

    #[test]
    fn test_review_rejected_routes_back_to_creator() {
        let router = EventRouter::new();
        assert_eq!(
            router.route(Hat::Critic, Topic::ReviewRejected),
            Ok(RouteOutcome::NextHat(Hat::Creator))
        );
    }

    #[test]
    fn test_blocked_routes_to_resolver() {
        let router = EventRouter::new();
        assert_eq!(
            router.route(Hat::Creator, Topic::TaskBlocked),
            Ok(RouteOutcome::NextHat(Hat::Resolver))
        );
    }

    #[test]
    fn test_priority_tie_break() {
        // plan.complete is subscribed by designer and creator; designer has
        // the higher fixed priority.
        let router = EventRouter::new();
        assert_eq!(
            router.route(Hat::Planner, Topic::PlanComplete),
            Ok(RouteOutcome::NextHat(Hat::Designer))
        );
    }

    #[test]
    fn test_resolved_routes_to_creator() {
        let router = EventRouter::new();
        assert_eq!(
            router.route(Hat::Resolver, Topic::Resolved),
            Ok(RouteOutcome::NextHat(Hat::Creator))
        );
    }

    #[test]
    fn test_every_publishable_pair_routes_or_terminates() {
        let router = EventRouter::new();
        for hat in Hat::ALL {
            for topic in hat.publishes() {
                let outcome = router.route(hat, *topic);
                assert!(outcome.is_ok(), "{} publishing {} failed: {:?}", hat, topic, outcome);
            }
        }
    }
}
