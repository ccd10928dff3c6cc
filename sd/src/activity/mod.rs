//! Activity recorder
//!
//! Writes the durable per-iteration event log and fans every record out on
//! the realtime broadcaster. Store writes are synchronous by design (the
//! activity log is the authoritative record) but best-effort: a failing
//! store is logged and the loop continues.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::broadcast::Broadcaster;
use crate::domain::{ActivityKind, ActivityRecord, Hat};
use crate::store::Store;

/// Per-session activity writer
#[derive(Clone)]
pub struct ActivityRecorder {
    store: Arc<dyn Store>,
    broadcaster: Arc<dyn Broadcaster>,
    session_id: String,
}

impl ActivityRecorder {
    pub fn new(store: Arc<dyn Store>, broadcaster: Arc<dyn Broadcaster>, session_id: impl Into<String>) -> Self {
        Self {
            store,
            broadcaster,
            session_id: session_id.into(),
        }
    }

    /// Record one event and broadcast it
    pub async fn record(&self, iteration: u32, hat: Hat, kind: ActivityKind, payload: Value) {
        self.write(ActivityRecord::new(&self.session_id, iteration, hat, kind, payload))
            .await;
    }

    /// Record one event with token attribution
    pub async fn record_with_tokens(
        &self,
        iteration: u32,
        hat: Hat,
        kind: ActivityKind,
        payload: Value,
        input_tokens: u64,
        output_tokens: u64,
    ) {
        self.write(
            ActivityRecord::new(&self.session_id, iteration, hat, kind, payload)
                .with_tokens(input_tokens, output_tokens),
        )
        .await;
    }

    async fn write(&self, record: ActivityRecord) {
        debug!(kind = record.kind.as_str(), iteration = record.iteration, "ActivityRecorder: write");

        let broadcast_payload = serde_json::to_value(&record).unwrap_or(Value::Null);

        if let Err(e) = self.store.create_activity(record).await {
            warn!(error = %e, session_id = %self.session_id, "ActivityRecorder: store write failed");
        }

        self.broadcaster.publish("activity.new", broadcast_payload);
    }
}
