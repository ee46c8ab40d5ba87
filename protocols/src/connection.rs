//! Connection record, shared between the connection manager and
//! the shared-store client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ConnectionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

/// The authoritative record of one live (or recently live) SSE connection.
///
/// Mutated only by its owning worker (activity, heartbeat) and by cleanup
/// (eviction). Persisted in the shared store under `sse:connections`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub client_addr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_hash: Option<String>,
    pub status: ConnectionStatus,
    pub connected_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub owning_worker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_id: Option<String>,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        client_addr: String,
        user_agent: Option<String>,
        credential_hash: Option<String>,
        owning_worker: String,
        client_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            client_addr,
            user_agent,
            credential_hash,
            status: ConnectionStatus::Connecting,
            connected_at: now,
            last_heartbeat: now,
            last_activity: now,
            owning_worker,
            client_id,
            last_event_id: None,
        }
    }

    pub fn touch_activity(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn touch_heartbeat(&mut self) {
        self.last_heartbeat = Utc::now();
    }

    pub fn age_seconds(&self) -> f64 {
        (Utc::now() - self.connected_at).num_milliseconds() as f64 / 1000.0
    }

    pub fn idle_seconds(&self) -> f64 {
        (Utc::now() - self.last_activity).num_milliseconds() as f64 / 1000.0
    }
}
