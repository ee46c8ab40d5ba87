//! Connection Manager: connection lifecycle, the
//! per-connection local queue, heartbeat, cleanup, and reconnect replay.
//!
//! The shared store is the cross-worker source of truth for the connection
//! table, the client-id map, and the per-connection ring buffer. This
//! process only owns the connections whose `owning_worker` matches
//! `worker_id`; those get a local queue that the SSE response stream
//! drains.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use futures::stream::{BoxStream, StreamExt};
use serde_json::{Map, Value};
use sse_protocol::{
    format_wire, new_event, Connection, ConnectionId, ConnectionStatus, Event, EventId, EventType,
};
use sse_store::SharedStore;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{info, warn};

use crate::error::BridgeResult;

use super::config::ManagerConfig;

/// Context captured when a client opens an SSE connection.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub client_addr: String,
    pub user_agent: Option<String>,
    pub credential_hash: Option<String>,
}

/// What a connection's local queue carries: an SSE frame, or the sentinel
/// that ends the stream.
enum QueueItem {
    Frame(Bytes),
    Close,
}

struct LocalConnection {
    tx: mpsc::Sender<QueueItem>,
}

/// Owns every connection terminated by this process.
pub struct ConnectionManager {
    store: Arc<dyn SharedStore>,
    worker_id: String,
    config: ManagerConfig,
    local: Arc<std::sync::Mutex<HashMap<ConnectionId, LocalConnection>>>,
    /// The receiving half of each connection's queue, taken exactly once by
    /// `stream()`. Kept separate from `local` because `mpsc::Receiver` isn't
    /// `Clone` and `send`/`close` only ever need the sender.
    receivers: Arc<std::sync::Mutex<HashMap<ConnectionId, mpsc::Receiver<QueueItem>>>>,
    send_locks: DashMap<ConnectionId, Arc<AsyncMutex<()>>>,
}

const CONNECTIONS_KEY: &str = "sse:connections";
const CLIENT_MAP_KEY: &str = "sse:client_map";

fn buffer_key(id: ConnectionId) -> String {
    format!("sse:buffers:{id}")
}

impl ConnectionManager {
    pub fn new(store: Arc<dyn SharedStore>, worker_id: String, config: ManagerConfig) -> Arc<Self> {
        Arc::new(Self {
            store,
            worker_id,
            config,
            local: Arc::new(std::sync::Mutex::new(HashMap::new())),
            receivers: Arc::new(std::sync::Mutex::new(HashMap::new())),
            send_locks: DashMap::new(),
        })
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    fn send_lock(&self, id: ConnectionId) -> Arc<AsyncMutex<()>> {
        self.send_locks.entry(id).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    /// Opens a new connection: creates the shared-store record, evicts a
    /// prior connection owned by the same `client_id` (reconnect takeover),
    /// emits `connection.opened`, and replays buffered events newer than
    /// `last_event_id` before returning.
    pub async fn open(
        &self,
        ctx: RequestContext,
        client_id: Option<String>,
        last_event_id: Option<EventId>,
    ) -> BridgeResult<ConnectionId> {
        let id = ConnectionId::new();
        let mut record = Connection::new(
            id,
            ctx.client_addr,
            ctx.user_agent,
            ctx.credential_hash,
            self.worker_id.clone(),
            client_id.clone(),
        );

        // Hard cap on the local queue: 4x the ring buffer size. A bounded
        // channel gives us that cap directly and a cheap
        // `capacity()`-derived occupancy check.
        let hard_cap = self.config.buffer_size * self.config.backpressure_hard_multiplier;
        let (tx, rx) = mpsc::channel(hard_cap.max(1));

        {
            let mut local = self.local.lock().expect("local connection map poisoned");
            local.insert(id, LocalConnection { tx: tx.clone() });
        }
        {
            let mut receivers = self.receivers.lock().expect("receiver map poisoned");
            receivers.insert(id, rx);
        }

        self.store
            .hash_set(CONNECTIONS_KEY, &id.to_string(), connection_json(&record))
            .await?;
        self.store.expire(&buffer_key(id), self.config.buffer_ttl.as_secs()).await.ok();

        if let Some(ref cid) = client_id {
            if let Some(prior) = self.store.hash_get(CLIENT_MAP_KEY, cid).await? {
                if let Ok(prior_id) = prior.parse::<ConnectionId>() {
                    if prior_id != id {
                        self.close(prior_id, "reconnected").await.ok();
                    }
                }
            }
            self.store.hash_set(CLIENT_MAP_KEY, cid, id.to_string()).await?;
        }

        let mut payload = Map::new();
        payload.insert("connection_id".into(), Value::String(id.to_string()));
        self.send(id, new_event(EventType::ConnectionOpened, id, payload, None)).await;

        // The record transitions to `connected` only after the opened event
        // has been enqueued.
        record.status = ConnectionStatus::Connected;
        self.store
            .hash_set(CONNECTIONS_KEY, &id.to_string(), connection_json(&record))
            .await?;

        if let Some(since) = last_event_id {
            self.replay(id, since, &tx).await?;
        }

        Ok(id)
    }

    /// Replays buffered events with id newer than `since`, oldest first.
    /// Best-effort: if `since` is older than the oldest buffered event the
    /// client simply gets everything retained (a warning is emitted).
    async fn replay(
        &self,
        id: ConnectionId,
        since: EventId,
        tx: &mpsc::Sender<QueueItem>,
    ) -> BridgeResult<()> {
        let raw = self.store.list_range(&buffer_key(id), 0, -1).await?;
        // The buffer is LPUSH'd (newest at index 0); replay oldest-first.
        let mut events: Vec<Event> = raw
            .iter()
            .rev()
            .filter_map(|s| serde_json::from_str::<Event>(s).ok())
            .collect();

        let since_str = since.to_string();
        if let Some(pos) = events.iter().position(|e| e.id.to_string() == since_str) {
            events.drain(..=pos);
        } else if !events.is_empty() {
            let mut warn_payload = Map::new();
            warn_payload.insert(
                "message".into(),
                Value::String("requested last-event-id predates the retained buffer".into()),
            );
            let event = new_event(EventType::ConnectionError, id, warn_payload, None);
            let _ = tx.send(QueueItem::Frame(Bytes::from(format_wire(&event)))).await;
        }

        for event in events {
            let _ = tx.send(QueueItem::Frame(Bytes::from(format_wire(&event)))).await;
        }
        Ok(())
    }

    /// Returns the byte stream of SSE frames for `id`, consuming this
    /// connection's receiver. Yields nothing if this process doesn't own
    /// the connection or the stream was already taken once.
    pub fn stream(self: &Arc<Self>, id: ConnectionId) -> BoxStream<'static, Bytes> {
        let rx = {
            let mut receivers = self.receivers.lock().expect("receiver map poisoned");
            match receivers.remove(&id) {
                Some(rx) => rx,
                None => return futures::stream::empty().boxed(),
            }
        };

        let manager = Arc::clone(self);
        let stream = async_stream::stream! {
            let mut rx = rx;
            while let Some(item) = rx.recv().await {
                manager.touch_activity(id).await;
                match item {
                    QueueItem::Frame(bytes) => yield bytes,
                    QueueItem::Close => break,
                }
            }
        };
        Box::pin(stream)
    }

    /// Appends `event` to the shared ring buffer (trimmed to N) and, if
    /// locally owned, pushes the formatted frame onto the local queue.
    /// Returns `false` if the connection does not exist in the shared
    /// table, or if the buffer write failed.
    pub async fn send(&self, id: ConnectionId, event: Event) -> bool {
        let lock = self.send_lock(id);
        let _guard = lock.lock().await;

        if !matches!(self.store.hash_exists(CONNECTIONS_KEY, &id.to_string()).await, Ok(true)) {
            return false;
        }

        let serialized = match serde_json::to_string(&event) {
            Ok(s) => s,
            Err(_) => return false,
        };
        let key = buffer_key(id);
        if self.store.list_push_front(&key, serialized).await.is_err() {
            return false;
        }
        let n = self.config.buffer_size as isize;
        if self.store.list_trim(&key, 0, n - 1).await.is_err() {
            return false;
        }
        self.store.expire(&key, self.config.buffer_ttl.as_secs()).await.ok();

        let frame = Bytes::from(format_wire(&event));
        let occupancy = {
            let local = self.local.lock().expect("local connection map poisoned");
            local.get(&id).map(|c| {
                let cap = c.tx.max_capacity();
                cap.saturating_sub(c.tx.capacity())
            })
        };

        let Some(occupancy) = occupancy else {
            // Not locally owned: the pub/sub bridge on the owning worker
            // will deliver it from the buffer write above.
            return true;
        };

        let soft = self.config.buffer_size * self.config.backpressure_soft_multiplier;
        let hard = self.config.buffer_size * self.config.backpressure_hard_multiplier;
        if occupancy >= hard {
            warn!(connection_id = %id, "local queue hard cap reached, closing for backpressure");
            drop(_guard);
            self.close(id, "backpressure").await.ok();
            return false;
        }
        if occupancy >= soft {
            warn!(connection_id = %id, occupancy, soft, "local queue nearing capacity");
        }

        let tx = {
            let local = self.local.lock().expect("local connection map poisoned");
            local.get(&id).map(|c| c.tx.clone())
        };
        if let Some(tx) = tx {
            if tx.try_send(QueueItem::Frame(frame)).is_err() {
                warn!(connection_id = %id, "local enqueue failed, dropping event");
                return false;
            }
        }
        true
    }

    /// Sends `(kind, payload)` to every connection in the shared table.
    /// Returns the number of connections it was enqueued for (a worker can
    /// only actually deliver to the ones it owns; the rest rely on the
    /// pub/sub bridge).
    pub async fn broadcast(&self, kind: EventType, payload: Map<String, Value>) -> usize {
        let Ok(ids) = self.store.hash_keys(CONNECTIONS_KEY).await else {
            return 0;
        };
        let mut count = 0;
        for raw_id in ids {
            let Ok(id) = raw_id.parse::<ConnectionId>() else { continue };
            let event = new_event(kind, id, payload.clone(), None);
            if self.send(id, event).await {
                count += 1;
            }
        }
        count
    }

    /// Idempotent: the second call on an already-closed connection is a
    /// no-op.
    pub async fn close(&self, id: ConnectionId, reason: &str) -> BridgeResult<()> {
        if !matches!(self.store.hash_exists(CONNECTIONS_KEY, &id.to_string()).await, Ok(true)) {
            return Ok(());
        }

        let mut payload = Map::new();
        payload.insert("reason".into(), Value::String(reason.to_string()));
        self.send(id, new_event(EventType::ConnectionClosed, id, payload, None)).await;

        if let Ok(Some(raw)) = self.store.hash_get(CONNECTIONS_KEY, &id.to_string()).await {
            if let Ok(record) = serde_json::from_str::<Connection>(&raw) {
                if let Some(client_id) = record.client_id {
                    if let Ok(Some(mapped)) = self.store.hash_get(CLIENT_MAP_KEY, &client_id).await {
                        if mapped == id.to_string() {
                            self.store.hash_delete(CLIENT_MAP_KEY, &client_id).await.ok();
                        }
                    }
                }
            }
        }

        let tx = {
            let mut local = self.local.lock().expect("local connection map poisoned");
            local.remove(&id).map(|c| c.tx)
        };
        if let Some(tx) = tx {
            let _ = tx.send(QueueItem::Close).await;
        }
        {
            let mut receivers = self.receivers.lock().expect("receiver map poisoned");
            receivers.remove(&id);
        }

        self.store.hash_delete(CONNECTIONS_KEY, &id.to_string()).await?;
        Ok(())
    }

    pub async fn touch_activity(&self, id: ConnectionId) {
        self.mutate_record(id, |record| record.touch_activity()).await;
    }

    /// Fetches a connection's current record from the shared table,
    /// regardless of which worker owns it.
    pub async fn connection(&self, id: ConnectionId) -> BridgeResult<Option<Connection>> {
        let Some(raw) = self.store.hash_get(CONNECTIONS_KEY, &id.to_string()).await? else {
            return Ok(None);
        };
        Ok(serde_json::from_str(&raw).ok())
    }

    /// Total connections live across every worker.
    pub async fn connection_count(&self) -> BridgeResult<u64> {
        Ok(self.store.hash_len(CONNECTIONS_KEY).await?)
    }

    /// Connections this process currently holds an open stream for.
    pub fn owned_connection_count(&self) -> usize {
        self.owned_connection_ids().len()
    }

    async fn mutate_record(&self, id: ConnectionId, f: impl FnOnce(&mut Connection)) {
        if let Ok(Some(raw)) = self.store.hash_get(CONNECTIONS_KEY, &id.to_string()).await {
            if let Ok(mut record) = serde_json::from_str::<Connection>(&raw) {
                f(&mut record);
                self.store
                    .hash_set(CONNECTIONS_KEY, &id.to_string(), connection_json(&record))
                    .await
                    .ok();
            }
        }
    }

    /// Heartbeat sweep: emits `connection.heartbeat` with a 30s
    /// retry hint for every connection owned by this worker.
    pub async fn heartbeat_sweep(&self) {
        let owned = self.owned_connection_ids();
        for id in owned {
            let Ok(Some(raw)) = self.store.hash_get(CONNECTIONS_KEY, &id.to_string()).await else {
                continue;
            };
            let Ok(record) = serde_json::from_str::<Connection>(&raw) else { continue };
            let mut payload = Map::new();
            payload.insert("age_seconds".into(), Value::from(record.age_seconds()));
            let event = new_event(
                EventType::ConnectionHeartbeat,
                id,
                payload,
                Some(self.config.heartbeat_retry_ms),
            );
            self.send(id, event).await;
            self.mutate_record(id, |r| r.touch_heartbeat()).await;
        }
    }

    /// Cleanup sweep: evicts idle-timed-out connections this
    /// worker owns, and deletes orphan buffer keys via cursor scan (never a
    /// full keyspace enumeration).
    pub async fn cleanup_sweep(&self) {
        let owned = self.owned_connection_ids();
        for id in owned {
            let Ok(Some(raw)) = self.store.hash_get(CONNECTIONS_KEY, &id.to_string()).await else {
                continue;
            };
            let Ok(record) = serde_json::from_str::<Connection>(&raw) else { continue };
            if record.idle_seconds() > self.config.idle_timeout.as_secs_f64() {
                info!(connection_id = %id, "evicting idle connection");
                self.close(id, "timeout").await.ok();
            }
        }

        let Ok(buffer_keys) = self.store.scan_match("sse:buffers:*").await else {
            return;
        };
        for key in buffer_keys {
            let id_str = key.trim_start_matches("sse:buffers:");
            let still_live = matches!(self.store.hash_exists(CONNECTIONS_KEY, id_str).await, Ok(true));
            if still_live {
                continue;
            }
            if let Ok(Some(ttl)) = self.store.ttl(&key).await {
                if ttl > 0 {
                    continue;
                }
            }
            self.store.list_delete(&key).await.ok();
        }
    }

    fn owned_connection_ids(&self) -> Vec<ConnectionId> {
        let local = self.local.lock().expect("local connection map poisoned");
        local.keys().copied().collect()
    }

    /// Used by the pub/sub bridge to learn whether this process should
    /// push a cross-worker-originated event into its local queue.
    pub fn owns(&self, id: ConnectionId) -> bool {
        let local = self.local.lock().expect("local connection map poisoned");
        local.contains_key(&id)
    }

    /// Pushes an already-buffer-persisted frame into the local queue only
    /// (used by the pub/sub bridge, which never re-writes the shared
    /// buffer — the originating worker already did).
    pub async fn deliver_local(&self, id: ConnectionId, event: &Event) -> bool {
        let tx = {
            let local = self.local.lock().expect("local connection map poisoned");
            local.get(&id).map(|c| c.tx.clone())
        };
        let Some(tx) = tx else { return false };
        let frame = Bytes::from(format_wire(event));
        tx.try_send(QueueItem::Frame(frame)).is_ok()
    }

    /// Broadcasts an already-buffer-persisted frame into every locally
    /// owned connection's queue (pub/sub bridge, `connection_id` absent).
    pub async fn deliver_local_all(&self, event_factory: impl Fn(ConnectionId) -> Event) {
        let ids = self.owned_connection_ids();
        for id in ids {
            self.deliver_local(id, &event_factory(id)).await;
        }
    }
}

fn connection_json(record: &Connection) -> String {
    serde_json::to_string(record).expect("Connection always serializes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use sse_store::MemoryStore;

    fn manager() -> Arc<ConnectionManager> {
        ConnectionManager::new(Arc::new(MemoryStore::new()), "worker-1".into(), ManagerConfig::default())
    }

    #[tokio::test]
    async fn open_emits_connected_record() {
        let mgr = manager();
        let id = mgr.open(RequestContext::default(), None, None).await.unwrap();
        let raw = mgr.store.hash_get(CONNECTIONS_KEY, &id.to_string()).await.unwrap().unwrap();
        let record: Connection = serde_json::from_str(&raw).unwrap();
        assert_eq!(record.status, ConnectionStatus::Connected);
        assert_eq!(record.owning_worker, "worker-1");
    }

    #[tokio::test]
    async fn reconnect_with_same_client_id_closes_prior() {
        let mgr = manager();
        let first = mgr.open(RequestContext::default(), Some("client-x".into()), None).await.unwrap();
        let second = mgr.open(RequestContext::default(), Some("client-x".into()), None).await.unwrap();
        assert_ne!(first, second);
        assert!(!matches!(mgr.store.hash_exists(CONNECTIONS_KEY, &first.to_string()).await, Ok(true)));
        let mapped = mgr.store.hash_get(CLIENT_MAP_KEY, "client-x").await.unwrap().unwrap();
        assert_eq!(mapped, second.to_string());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let mgr = manager();
        let id = mgr.open(RequestContext::default(), None, None).await.unwrap();
        mgr.close(id, "stream_ended").await.unwrap();
        mgr.close(id, "stream_ended").await.unwrap();
    }

    #[tokio::test]
    async fn broadcast_reaches_every_connection() {
        let mgr = manager();
        let _a = mgr.open(RequestContext::default(), None, None).await.unwrap();
        let _b = mgr.open(RequestContext::default(), None, None).await.unwrap();
        let mut payload = Map::new();
        payload.insert("msg".into(), Value::String("hi".into()));
        let count = mgr.broadcast(EventType::StatusUpdate, payload).await;
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn buffer_never_exceeds_configured_size() {
        let mut cfg = ManagerConfig::default();
        cfg.buffer_size = 3;
        let mgr = ConnectionManager::new(Arc::new(MemoryStore::new()), "w1".into(), cfg);
        let id = mgr.open(RequestContext::default(), None, None).await.unwrap();
        for i in 0..10 {
            let mut payload = Map::new();
            payload.insert("i".into(), Value::from(i));
            mgr.send(id, new_event(EventType::StatusUpdate, id, payload, None)).await;
        }
        let stored = mgr.store.list_range(&buffer_key(id), 0, -1).await.unwrap();
        assert!(stored.len() <= 3);
    }
}
