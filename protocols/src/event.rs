//! SSE event model and wire format.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{ConnectionId, EventId};

/// The closed set of event types the bridge ever emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ConnectionOpened,
    ConnectionHeartbeat,
    ConnectionClosed,
    ConnectionError,
    McpToolCall,
    McpToolResponse,
    McpToolError,
    McpToolProgress,
    RenderStarted,
    RenderProgress,
    RenderCompleted,
    RenderFailed,
    ValidationStarted,
    ValidationCompleted,
    ValidationFailed,
    StatusUpdate,
    ServerError,
    RateLimitWarning,
    RateLimitExceeded,
}

impl EventType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionOpened => "connection.opened",
            Self::ConnectionHeartbeat => "connection.heartbeat",
            Self::ConnectionClosed => "connection.closed",
            Self::ConnectionError => "connection.error",
            Self::McpToolCall => "mcp.tool.call",
            Self::McpToolResponse => "mcp.tool.response",
            Self::McpToolError => "mcp.tool.error",
            Self::McpToolProgress => "mcp.tool.progress",
            Self::RenderStarted => "render.started",
            Self::RenderProgress => "render.progress",
            Self::RenderCompleted => "render.completed",
            Self::RenderFailed => "render.failed",
            Self::ValidationStarted => "validation.started",
            Self::ValidationCompleted => "validation.completed",
            Self::ValidationFailed => "validation.failed",
            Self::StatusUpdate => "status.update",
            Self::ServerError => "server.error",
            Self::RateLimitWarning => "rate_limit.warning",
            Self::RateLimitExceeded => "rate_limit.exceeded",
        }
    }

    /// Parses a dotted event-type name back into its variant. The inverse
    /// of [`EventType::as_str`]; used by the pub/sub bridge to classify
    /// cross-worker envelopes and by the broadcast endpoint to validate a
    /// caller-supplied event type.
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "connection.opened" => Self::ConnectionOpened,
            "connection.heartbeat" => Self::ConnectionHeartbeat,
            "connection.closed" => Self::ConnectionClosed,
            "connection.error" => Self::ConnectionError,
            "mcp.tool.call" => Self::McpToolCall,
            "mcp.tool.response" => Self::McpToolResponse,
            "mcp.tool.error" => Self::McpToolError,
            "mcp.tool.progress" => Self::McpToolProgress,
            "render.started" => Self::RenderStarted,
            "render.progress" => Self::RenderProgress,
            "render.completed" => Self::RenderCompleted,
            "render.failed" => Self::RenderFailed,
            "validation.started" => Self::ValidationStarted,
            "validation.completed" => Self::ValidationCompleted,
            "validation.failed" => Self::ValidationFailed,
            "status.update" => Self::StatusUpdate,
            "server.error" => Self::ServerError,
            "rate_limit.warning" => Self::RateLimitWarning,
            "rate_limit.exceeded" => Self::RateLimitExceeded,
            _ => return None,
        })
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable, append-only SSE event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    #[serde(rename = "type")]
    pub kind: EventType,
    pub connection_id: ConnectionId,
    pub payload: Map<String, Value>,
    pub emitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_ms: Option<u64>,
}

/// Assign a fresh id and timestamp to a new event.
pub fn new_event(
    kind: EventType,
    connection_id: ConnectionId,
    payload: Map<String, Value>,
    retry_ms: Option<u64>,
) -> Event {
    Event {
        id: EventId::new(),
        kind,
        connection_id,
        payload,
        emitted_at: Utc::now(),
        retry_ms,
    }
}

/// Render an event as an SSE wire frame: `id:`, `event:`, optional `retry:`,
/// `data:`, terminated by a blank line.
pub fn format_wire(event: &Event) -> Vec<u8> {
    let mut out = String::new();
    out.push_str("id: ");
    out.push_str(&event.id.to_string());
    out.push('\n');
    out.push_str("event: ");
    out.push_str(event.kind.as_str());
    out.push('\n');
    if let Some(retry) = event.retry_ms {
        out.push_str("retry: ");
        out.push_str(&retry.to_string());
        out.push('\n');
    }
    out.push_str("data: ");
    // serde_json::Map serialization never fails for JSON-compatible values.
    out.push_str(&serde_json::to_string(&event.payload).unwrap_or_else(|_| "{}".to_string()));
    out.push_str("\n\n");
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_frame_has_blank_line_terminator() {
        let mut payload = Map::new();
        payload.insert("message".into(), Value::String("hi".into()));
        let event = new_event(EventType::ConnectionOpened, ConnectionId::new(), payload, None);
        let frame = String::from_utf8(format_wire(&event)).unwrap();
        assert!(frame.starts_with("id: "));
        assert!(frame.contains("event: connection.opened\n"));
        assert!(frame.ends_with("\n\n"));
        assert!(!frame.contains("retry:"));
    }

    #[test]
    fn heartbeat_includes_retry_hint() {
        let event = new_event(EventType::ConnectionHeartbeat, ConnectionId::new(), Map::new(), Some(30_000));
        let frame = String::from_utf8(format_wire(&event)).unwrap();
        assert!(frame.contains("retry: 30000\n"));
    }

    #[test]
    fn event_type_dotted_names_are_lowercase() {
        assert_eq!(EventType::RenderProgress.as_str(), "render.progress");
        assert_eq!(EventType::RateLimitExceeded.as_str(), "rate_limit.exceeded");
    }

    #[test]
    fn parse_is_the_inverse_of_as_str() {
        let all = [
            EventType::ConnectionOpened,
            EventType::ConnectionHeartbeat,
            EventType::ConnectionClosed,
            EventType::ConnectionError,
            EventType::McpToolCall,
            EventType::McpToolResponse,
            EventType::McpToolError,
            EventType::McpToolProgress,
            EventType::RenderStarted,
            EventType::RenderProgress,
            EventType::RenderCompleted,
            EventType::RenderFailed,
            EventType::ValidationStarted,
            EventType::ValidationCompleted,
            EventType::ValidationFailed,
            EventType::StatusUpdate,
            EventType::ServerError,
            EventType::RateLimitWarning,
            EventType::RateLimitExceeded,
        ];
        for kind in all {
            assert_eq!(EventType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EventType::parse("nonexistent.event"), None);
    }
}
