//! Pub/Sub Bridge: the one long-running task per
//! process that subscribes to the cross-worker `sse_events` channel and
//! delivers envelopes published by other workers (or background render
//! workers, via the Task Tracker) to the connections this process owns.
//!
//! A background render worker cannot push frames directly into the HTTP
//! stream an API worker is holding open, so it publishes a JSON envelope
//! instead; every worker's bridge ingests the envelope and, if it owns the
//! target connection, pushes the frame locally. The shared buffer has
//! already been written by whichever worker called `ConnectionManager::send`
//! first, so this only ever takes the local-delivery path.

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Map, Value};
use sse_protocol::{new_event, ConnectionId, EventType};
use sse_store::SharedStore;
use tracing::{error, warn};

use crate::core::ConnectionManager;

pub const CHANNEL: &str = "sse_events";

const RESUBSCRIBE_INITIAL_INTERVAL: Duration = Duration::from_secs(1);
const RESUBSCRIBE_MAX_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct Envelope {
    event_type: String,
    #[serde(default)]
    connection_id: Option<ConnectionId>,
    data: Map<String, Value>,
}

/// Owns the subscription loop. `run` never returns except when the store
/// subscription itself cannot be re-established; callers spawn it as a
/// supervised background task.
pub struct PubSubBridge {
    store: Arc<dyn SharedStore>,
    manager: Arc<ConnectionManager>,
}

impl PubSubBridge {
    pub fn new(store: Arc<dyn SharedStore>, manager: Arc<ConnectionManager>) -> Self {
        Self { store, manager }
    }

    /// Subscribes to [`CHANNEL`] and dispatches forever. On a subscription
    /// error, retries with an exponential back-off (reset once a
    /// subscription is actually established); this is a supervised loop
    /// and must never give up, since a subscribe failure here is never
    /// fatal to the worker process.
    pub async fn run(&self) {
        loop {
            let mut backoff = ExponentialBackoffBuilder::new()
                .with_initial_interval(RESUBSCRIBE_INITIAL_INTERVAL)
                .with_max_interval(RESUBSCRIBE_MAX_INTERVAL)
                .with_max_elapsed_time(None)
                .build();

            let mut messages = loop {
                match self.store.subscribe(CHANNEL).await {
                    Ok(messages) => break messages,
                    Err(err) => {
                        let delay = backoff.next_backoff().unwrap_or(RESUBSCRIBE_MAX_INTERVAL);
                        error!(error = %err, delay_ms = delay.as_millis() as u64, "pub/sub subscribe failed, retrying");
                        tokio::time::sleep(delay).await;
                    }
                }
            };

            while let Some(raw) = messages.next().await {
                self.dispatch(&raw).await;
            }
            warn!("pub/sub subscription ended, resubscribing");
        }
    }

    async fn dispatch(&self, raw: &str) {
        let envelope: Envelope = match serde_json::from_str(raw) {
            Ok(e) => e,
            Err(err) => {
                warn!(error = %err, "dropping malformed pub/sub envelope");
                return;
            }
        };

        let kind = match EventType::parse(&envelope.event_type) {
            Some(k) => k,
            None => {
                warn!(event_type = %envelope.event_type, "dropping unknown pub/sub event type");
                return;
            }
        };

        match envelope.connection_id {
            Some(id) => {
                if self.manager.owns(id) {
                    let event = new_event(kind, id, envelope.data, None);
                    self.manager.send(id, event).await;
                }
            }
            None => {
                self.manager
                    .deliver_local_all(|id| new_event(kind, id, envelope.data.clone(), None))
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sse_store::MemoryStore;
    use std::time::Duration as StdDuration;

    use crate::core::{ManagerConfig, RequestContext};

    async fn open_connection(manager: &Arc<ConnectionManager>) -> ConnectionId {
        manager
            .open(RequestContext::default(), None, None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn envelope_with_connection_id_delivers_only_to_owner() {
        let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
        let manager = ConnectionManager::new(store.clone(), "worker-1".into(), ManagerConfig::default());
        let bridge = PubSubBridge::new(store, manager.clone());

        let target = open_connection(&manager).await;
        let other = open_connection(&manager).await;

        let mut stream_target = manager.stream(target);
        let mut stream_other = manager.stream(other);
        // Drain the connection.opened frame each stream already has queued.
        let _ = tokio::time::timeout(StdDuration::from_millis(50), stream_target.next()).await;
        let _ = tokio::time::timeout(StdDuration::from_millis(50), stream_other.next()).await;

        let envelope = serde_json::json!({
            "event_type": "status.update",
            "connection_id": target.to_string(),
            "data": {"msg": "hi"},
        })
        .to_string();
        bridge.dispatch(&envelope).await;

        let got = tokio::time::timeout(StdDuration::from_millis(50), stream_target.next()).await;
        assert!(got.is_ok());

        let none = tokio::time::timeout(StdDuration::from_millis(50), stream_other.next()).await;
        assert!(none.is_err(), "connection without the matching id must not receive the event");
    }

    #[test]
    fn unknown_event_type_is_not_classified() {
        assert!(EventType::parse("nonexistent.event").is_none());
        assert_eq!(EventType::parse("status.update"), Some(EventType::StatusUpdate));
    }
}
