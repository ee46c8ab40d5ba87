//! Task Tracker: persists task state in the shared
//! store and drives SSE emission for render jobs running on background
//! workers.
//!
//! A background worker never holds the SSE connection open, so it cannot
//! call the Connection Manager directly. Instead it calls [`TaskTracker::update`],
//! which writes the authoritative task hash and publishes a progress
//! envelope on the same `sse_events` channel the pub/sub bridge listens
//! on; whichever API worker owns the target connection picks it up from
//! there.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use sse_protocol::{ConnectionId, Task, TaskId, TaskStatus, TASK_TTL_SECONDS};
use sse_store::SharedStore;
use tracing::warn;

use crate::error::{TrackerError, TrackerResult};

const TASK_KEY_PREFIX: &str = "task:";
const EVENTS_CHANNEL: &str = "sse_events";

fn task_key(id: &TaskId) -> String {
    format!("{TASK_KEY_PREFIX}{id}")
}

pub struct TaskTracker {
    store: Arc<dyn SharedStore>,
}

impl TaskTracker {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    /// Writes the task hash (creating it on first use) and publishes the
    /// derived progress envelope. `result` carries the render payload on
    /// success, or `{error, details?}` on failure.
    pub async fn update(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        progress: Option<u8>,
        message: Option<String>,
        result: Option<Map<String, Value>>,
        connection_id: Option<ConnectionId>,
    ) -> TrackerResult<()> {
        let key = task_key(task_id);
        let existing = self.store.hash_get_all(&key).await?;

        let created_at = existing
            .get("created_at")
            .and_then(|s| s.parse::<chrono::DateTime<Utc>>().ok())
            .unwrap_or_else(Utc::now);
        let updated_at = Utc::now();

        let mut fields = vec![
            ("status".to_string(), status.as_str().to_string()),
            ("progress".to_string(), progress.unwrap_or(0).to_string()),
            ("created_at".to_string(), created_at.to_rfc3339()),
            ("updated_at".to_string(), updated_at.to_rfc3339()),
        ];
        // Null-valued fields are never written: omit rather than
        // serialize Option::None into the store.
        if let Some(message) = &message {
            fields.push(("message".to_string(), message.clone()));
        }
        if let Some(result) = &result {
            let encoded = serde_json::to_string(result)
                .map_err(|e| TrackerError::ResultSerialize(e.to_string()))?;
            fields.push(("result".to_string(), encoded));
        }

        self.store.hash_set_multi(&key, fields).await?;
        self.store.expire(&key, TASK_TTL_SECONDS).await?;

        let processing_time = (updated_at - created_at).num_milliseconds() as f64 / 1000.0;
        let envelope = self.build_envelope(
            task_id,
            status,
            progress,
            message.as_deref(),
            result.as_ref(),
            processing_time,
        );

        let payload = serde_json::json!({
            "event_type": envelope.0,
            "connection_id": connection_id.map(|c| c.to_string()),
            "data": envelope.1,
        });
        if let Err(err) = self.store.publish(EVENTS_CHANNEL, payload.to_string()).await {
            warn!(task_id = %task_id, error = %err, "failed to publish task progress envelope");
        }

        Ok(())
    }

    pub async fn get(&self, task_id: &TaskId) -> TrackerResult<Option<Map<String, Value>>> {
        let key = task_key(task_id);
        let fields = self.store.hash_get_all(&key).await?;
        if fields.is_empty() {
            return Ok(None);
        }

        let mut map = Map::new();
        for (field, value) in &fields {
            if field == "result" {
                let parsed: Value = serde_json::from_str(value)
                    .unwrap_or_else(|_| Value::Object(Map::new()));
                map.insert("result".to_string(), parsed);
            } else if field == "progress" {
                map.insert(
                    "progress".to_string(),
                    Value::from(value.parse::<u64>().unwrap_or(0)),
                );
            } else {
                map.insert(field.clone(), Value::String(value.clone()));
            }
        }
        Ok(Some(map))
    }

    /// Derives `(event_type, payload)` from the task's status.
    /// Falls back to a minimal `{task_id, status, processing_time, error?,
    /// timestamps}` shape if the result map cannot be carried faithfully.
    fn build_envelope(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        progress: Option<u8>,
        message: Option<&str>,
        result: Option<&Map<String, Value>>,
        processing_time: f64,
    ) -> (&'static str, Value) {
        match status {
            TaskStatus::Processing | TaskStatus::Pending | TaskStatus::Cancelled => {
                let payload = serde_json::json!({
                    "task_id": task_id.to_string(),
                    "progress": progress.unwrap_or(0),
                    "status": status.as_str(),
                    "message": message.unwrap_or_default(),
                });
                ("render.progress", payload)
            }
            TaskStatus::Completed => {
                let result_value = result.cloned().map(Value::Object).unwrap_or(Value::Null);
                let payload = serde_json::json!({
                    "task_id": task_id.to_string(),
                    "result": result_value,
                    "processing_time": processing_time,
                    "message": message.unwrap_or_default(),
                });
                ("render.completed", payload)
            }
            TaskStatus::Failed => {
                let error = result
                    .and_then(|r| r.get("error"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown error")
                    .to_string();
                let details = result
                    .and_then(|r| r.get("details"))
                    .cloned()
                    .unwrap_or(Value::Object(Map::new()));
                let payload = serde_json::json!({
                    "task_id": task_id.to_string(),
                    "error": error,
                    "details": details,
                    "message": message.unwrap_or_default(),
                });
                ("render.failed", payload)
            }
        }
    }

    /// Minimal fallback shape used when a caller's result cannot be
    /// serialized faithfully (`ErrorKind::ResultSerialize`).
    pub fn fallback_result(task: &Task, error: Option<&str>) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("task_id".to_string(), Value::String(task.id.to_string()));
        map.insert("status".to_string(), Value::String(task.status.as_str().to_string()));
        map.insert(
            "processing_time".to_string(),
            Value::from((task.updated_at - task.created_at).num_milliseconds() as f64 / 1000.0),
        );
        if let Some(error) = error {
            map.insert("error".to_string(), Value::String(error.to_string()));
        }
        map.insert("created_at".to_string(), Value::String(task.created_at.to_rfc3339()));
        map.insert("updated_at".to_string(), Value::String(task.updated_at.to_rfc3339()));
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sse_store::MemoryStore;

    fn tracker() -> TaskTracker {
        TaskTracker::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn update_then_get_roundtrips_status_and_progress() {
        let tracker = tracker();
        let id = TaskId::new();
        tracker
            .update(&id, TaskStatus::Processing, Some(42), Some("halfway".into()), None, None)
            .await
            .unwrap();

        let got = tracker.get(&id).await.unwrap().unwrap();
        assert_eq!(got.get("status").unwrap().as_str().unwrap(), "processing");
        assert_eq!(got.get("progress").unwrap().as_u64().unwrap(), 42);
    }

    #[tokio::test]
    async fn completed_status_carries_result_map() {
        let tracker = tracker();
        let id = TaskId::new();
        let mut result = Map::new();
        result.insert("width".into(), Value::from(400));
        tracker
            .update(&id, TaskStatus::Completed, Some(100), None, Some(result), None)
            .await
            .unwrap();

        let got = tracker.get(&id).await.unwrap().unwrap();
        assert_eq!(got["result"]["width"], Value::from(400));
    }

    #[tokio::test]
    async fn missing_task_returns_none() {
        let tracker = tracker();
        let id = TaskId::new();
        assert!(tracker.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn created_at_is_preserved_across_updates() {
        let tracker = tracker();
        let id = TaskId::new();
        tracker.update(&id, TaskStatus::Pending, Some(0), None, None, None).await.unwrap();
        let first = tracker.get(&id).await.unwrap().unwrap();
        let created_first = first["created_at"].clone();

        tracker.update(&id, TaskStatus::Processing, Some(10), None, None, None).await.unwrap();
        let second = tracker.get(&id).await.unwrap().unwrap();
        assert_eq!(second["created_at"], created_first);
    }
}
