//! Audit logging for authentication decisions on the SSE HTTP surface.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Allowed,
    Denied,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub principal: Option<String>,
    pub method: String,
    pub path: String,
    pub outcome: AuditOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Thin wrapper around `tracing` so audit events are structured and
/// greppable without pulling in a separate audit sink dependency.
#[derive(Debug, Default)]
pub struct AuditLogger;

impl AuditLogger {
    pub fn new() -> Self {
        Self
    }

    pub fn record(&self, event: AuditEvent) {
        match event.outcome {
            AuditOutcome::Allowed => info!(
                principal = event.principal.as_deref().unwrap_or("-"),
                method = %event.method,
                path = %event.path,
                request_id = event.request_id.as_deref().unwrap_or("-"),
                "auth allowed"
            ),
            AuditOutcome::Denied => warn!(
                principal = event.principal.as_deref().unwrap_or("-"),
                method = %event.method,
                path = %event.path,
                request_id = event.request_id.as_deref().unwrap_or("-"),
                reason = event.reason.as_deref().unwrap_or("-"),
                "auth denied"
            ),
        }
    }
}
