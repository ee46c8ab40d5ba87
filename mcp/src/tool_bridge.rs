//! Tool Bridge: executes a typed tool request while
//! emitting the SSE event sequence clients observe on the connection that
//! submitted it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use sse_protocol::{
    new_event, parse_tool_output, ConnectionId, EventType, RenderOptions, RenderTaskRequest,
    Renderer, StatusTool, TaskId, TaskQueue, ToolName, ToolRequest, Validator,
};
use tracing::warn;
use uuid::Uuid;
use wfaas::TaskTracker;

use crate::core::ConnectionManager;
use crate::error::{BridgeError, BridgeResult};

const SYNC_RENDER_TIMEOUT: Duration = Duration::from_secs(60);
const ASYNC_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
pub struct ToolResponse {
    pub success: bool,
    pub tool_name: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time: f64,
    pub events_sent: u32,
}

struct ActiveRequest {
    connection_id: ConnectionId,
    cancelled: bool,
}

/// Orchestrates the three tools over the connection manager, a render
/// task queue, and the task tracker. Holds an in-process table of
/// in-flight requests so `cancel` can mark them before the next event.
pub struct ToolBridge {
    manager: Arc<ConnectionManager>,
    renderer: Arc<dyn Renderer>,
    validator: Arc<dyn Validator>,
    status_tool: Arc<dyn StatusTool>,
    task_queue: Arc<dyn TaskQueue>,
    tracker: Arc<TaskTracker>,
    active: Mutex<HashMap<String, ActiveRequest>>,
}

impl ToolBridge {
    pub fn new(
        manager: Arc<ConnectionManager>,
        renderer: Arc<dyn Renderer>,
        validator: Arc<dyn Validator>,
        status_tool: Arc<dyn StatusTool>,
        task_queue: Arc<dyn TaskQueue>,
        tracker: Arc<TaskTracker>,
    ) -> Self {
        Self {
            manager,
            renderer,
            validator,
            status_tool,
            task_queue,
            tracker,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub async fn execute(&self, request: ToolRequest) -> BridgeResult<ToolResponse> {
        let start = Instant::now();
        let request_id = request.request_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let connection_id = request.connection_id;
        let mut events_sent: u32 = 0;

        self.active.lock().insert(
            request_id.clone(),
            ActiveRequest { connection_id, cancelled: false },
        );

        let mut payload = Map::new();
        payload.insert("tool_name".into(), Value::String(request.tool_name.clone()));
        payload.insert("arguments".into(), Value::Object(request.arguments.clone()));
        payload.insert("request_id".into(), Value::String(request_id.clone()));
        if self.emit(connection_id, EventType::McpToolCall, payload).await {
            events_sent += 1;
        }

        let dispatch_result = match ToolName::parse(&request.tool_name) {
            Some(ToolName::RenderUiMockup) => {
                self.render_ui_mockup(connection_id, &request_id, &request.arguments, &mut events_sent).await
            }
            Some(ToolName::ValidateDsl) => {
                self.validate_dsl(connection_id, &request.arguments, &mut events_sent).await
            }
            Some(ToolName::GetRenderStatus) => self.get_render_status(&request.arguments).await,
            None => Err(BridgeError::UnknownTool(request.tool_name.clone())),
        };

        self.active.lock().remove(&request_id);
        let execution_time = start.elapsed().as_secs_f64();

        match dispatch_result {
            Ok(result) => {
                let mut payload = Map::new();
                payload.insert("success".into(), Value::Bool(true));
                payload.insert("tool_name".into(), Value::String(request.tool_name.clone()));
                payload.insert("request_id".into(), Value::String(request_id.clone()));
                payload.insert("result".into(), result.clone());
                if self.emit(connection_id, EventType::McpToolResponse, payload).await {
                    events_sent += 1;
                }
                Ok(ToolResponse {
                    success: true,
                    tool_name: request.tool_name,
                    request_id,
                    result: Some(result),
                    error: None,
                    execution_time,
                    events_sent,
                })
            }
            Err(err) => {
                // Step 5 of the tool-execution protocol always reports this
                // fixed code on the connection; the specific failure kind
                // is still distinguishable via the HTTP response body and,
                // for renders, the render.failed event emitted earlier.
                let mut payload = Map::new();
                payload.insert("code".into(), Value::String("TOOL_EXECUTION_ERROR".to_string()));
                payload.insert("message".into(), Value::String(err.to_string()));
                if self.emit(connection_id, EventType::ConnectionError, payload).await {
                    events_sent += 1;
                }
                Ok(ToolResponse {
                    success: false,
                    tool_name: request.tool_name,
                    request_id,
                    result: None,
                    error: Some(err.to_string()),
                    execution_time,
                    events_sent,
                })
            }
        }
    }

    /// Marks an in-flight request cancelled. Returns `false` if the
    /// request is unknown (already completed or never existed).
    pub async fn cancel(&self, request_id: &str) -> bool {
        let connection_id = {
            let mut active = self.active.lock();
            match active.get_mut(request_id) {
                Some(entry) => {
                    entry.cancelled = true;
                    Some(entry.connection_id)
                }
                None => None,
            }
        };
        let Some(connection_id) = connection_id else { return false };

        if let Ok(task_id) = request_id.parse::<TaskId>() {
            self.task_queue.revoke(&task_id).await.ok();
        }

        let mut payload = Map::new();
        payload.insert("code".into(), Value::String("TOOL_CANCELLED".to_string()));
        payload.insert("message".into(), Value::String(format!("request {request_id} cancelled")));
        self.emit(connection_id, EventType::ConnectionError, payload).await;
        true
    }

    fn is_cancelled(&self, request_id: &str) -> bool {
        self.active.lock().get(request_id).map(|r| r.cancelled).unwrap_or(false)
    }

    async fn emit(&self, connection_id: ConnectionId, kind: EventType, payload: Map<String, Value>) -> bool {
        let event = new_event(kind, connection_id, payload, None);
        self.manager.send(connection_id, event).await
    }

    async fn render_ui_mockup(
        &self,
        connection_id: ConnectionId,
        request_id: &str,
        arguments: &Map<String, Value>,
        events_sent: &mut u32,
    ) -> BridgeResult<Value> {
        let options = RenderOptions::from_raw(arguments.get("options"));
        let dsl_content = normalize_dsl(arguments.get("dsl_content"))?;
        let async_mode = arguments.get("async_mode").and_then(Value::as_bool).unwrap_or(false);

        if async_mode {
            return self.render_async(connection_id, dsl_content, options).await;
        }

        if self.emit(connection_id, EventType::RenderStarted, options_payload(&options)).await {
            *events_sent += 1;
        }

        let mut progress = Map::new();
        progress.insert("progress".into(), Value::from(10));
        progress.insert("message".into(), Value::String("Starting DSL parsing".to_string()));
        progress.insert("stage".into(), Value::String("parsing".to_string()));
        if self.emit(connection_id, EventType::RenderProgress, progress).await {
            *events_sent += 1;
        }

        if self.is_cancelled(request_id) {
            return Err(BridgeError::Internal("cancelled".to_string()));
        }

        let render_start = Instant::now();
        let render = tokio::time::timeout(SYNC_RENDER_TIMEOUT, self.renderer.render(&dsl_content, &options))
            .await
            .map_err(|_| BridgeError::ToolTimeout("render_ui_mockup timed out".to_string()))?
            .map_err(BridgeError::from)?;
        let processing_time = render_start.elapsed().as_secs_f64();

        let parsed = parse_tool_output(&render, "render_ui_mockup")?;
        let succeeded = parsed.get("success").and_then(Value::as_bool).unwrap_or(false);

        if succeeded {
            let mut payload = parsed.clone();
            payload.insert("processing_time".into(), Value::from(processing_time));
            if self.emit(connection_id, EventType::RenderCompleted, payload).await {
                *events_sent += 1;
            }
            Ok(Value::Object(parsed))
        } else {
            let error_msg = parsed
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("render failed")
                .to_string();
            let mut payload = Map::new();
            payload.insert("error".into(), Value::String(error_msg.clone()));
            if self.emit(connection_id, EventType::RenderFailed, payload).await {
                *events_sent += 1;
            }
            Err(BridgeError::Internal(error_msg))
        }
    }

    async fn render_async(
        &self,
        connection_id: ConnectionId,
        dsl_content: Value,
        options: RenderOptions,
    ) -> BridgeResult<Value> {
        let task_id = self
            .task_queue
            .submit(RenderTaskRequest { dsl_content, options }, Some(connection_id))
            .await?;

        let manager = Arc::clone(&self.manager);
        let tracker = Arc::clone(&self.tracker);
        let monitor_task_id = task_id;
        tokio::spawn(async move {
            monitor_async_render(manager, tracker, monitor_task_id, connection_id).await;
        });

        Ok(serde_json::json!({
            "async": true,
            "task_id": task_id.to_string(),
            "message": "render submitted",
            "status_check_tool": "get_render_status",
        }))
    }

    async fn validate_dsl(
        &self,
        connection_id: ConnectionId,
        arguments: &Map<String, Value>,
        events_sent: &mut u32,
    ) -> BridgeResult<Value> {
        let dsl_content = normalize_dsl(arguments.get("dsl_content"))?;

        let mut progress = Map::new();
        progress.insert("progress".into(), Value::from(50));
        progress.insert("message".into(), Value::String("Validating DSL syntax".to_string()));
        progress.insert("stage".into(), Value::String("validation".to_string()));
        if self.emit(connection_id, EventType::RenderProgress, progress).await {
            *events_sent += 1;
        }

        let raw = self.validator.validate(&dsl_content).await.map_err(BridgeError::from)?;
        let parsed = parse_tool_output(&raw, "validate_dsl")?;

        if self.emit(connection_id, EventType::ValidationCompleted, parsed.clone()).await {
            *events_sent += 1;
        }
        Ok(Value::Object(parsed))
    }

    async fn get_render_status(&self, arguments: &Map<String, Value>) -> BridgeResult<Value> {
        let task_id = arguments
            .get("task_id")
            .and_then(Value::as_str)
            .ok_or_else(|| BridgeError::InvalidArguments("task_id is required".to_string()))?;
        let include_result = arguments.get("include_result").and_then(Value::as_bool).unwrap_or(false);

        let raw = self.status_tool.status(task_id, include_result).await.map_err(BridgeError::from)?;
        let parsed = parse_tool_output(&raw, "get_render_status")?;
        Ok(Value::Object(parsed))
    }
}

fn options_payload(options: &RenderOptions) -> Map<String, Value> {
    match serde_json::to_value(options) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// If `dsl_content` arrives as a string, parses it as JSON and
/// re-serializes into canonical form; otherwise it must already be an
/// object/array value.
fn normalize_dsl(raw: Option<&Value>) -> BridgeResult<Value> {
    match raw {
        Some(Value::String(s)) => serde_json::from_str(s)
            .map_err(|e| BridgeError::ValidationError(format!("invalid DSL JSON: {e}"))),
        Some(other) => Ok(other.clone()),
        None => Err(BridgeError::InvalidArguments("dsl_content is required".to_string())),
    }
}

async fn monitor_async_render(
    manager: Arc<ConnectionManager>,
    tracker: Arc<TaskTracker>,
    task_id: TaskId,
    connection_id: ConnectionId,
) {
    loop {
        tokio::time::sleep(ASYNC_POLL_INTERVAL).await;
        let Ok(Some(task)) = tracker.get(&task_id).await else { continue };
        let Some(status) = task.get("status").and_then(Value::as_str) else { continue };

        match status {
            "completed" => {
                let result = task.get("result").cloned().unwrap_or(Value::Null);
                let mut payload = Map::new();
                payload.insert("task_id".into(), Value::String(task_id.to_string()));
                payload.insert("result".into(), result);
                let event = new_event(EventType::RenderCompleted, connection_id, payload, None);
                manager.send(connection_id, event).await;
                return;
            }
            "failed" => {
                let error = task
                    .get("result")
                    .and_then(|r| r.get("error"))
                    .and_then(Value::as_str)
                    .unwrap_or("render failed")
                    .to_string();
                let mut payload = Map::new();
                payload.insert("task_id".into(), Value::String(task_id.to_string()));
                payload.insert("error".into(), Value::String(error));
                let event = new_event(EventType::RenderFailed, connection_id, payload, None);
                manager.send(connection_id, event).await;
                return;
            }
            "cancelled" => return,
            _ => {
                if !manager.owns(connection_id) {
                    warn!(connection_id = %connection_id, "async render monitor outliving its connection's owning worker");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sse_protocol::RendererError;
    use sse_store::MemoryStore;

    use crate::core::{ManagerConfig, RequestContext};

    struct FakeRenderer;
    #[async_trait]
    impl Renderer for FakeRenderer {
        async fn render(&self, _dsl: &Value, _options: &RenderOptions) -> Result<Value, RendererError> {
            Ok(serde_json::json!([{
                "success": true,
                "png_result": {"base64_data": "Zg==", "width": 400, "height": 200, "file_size": 2, "metadata": {}},
                "processing_time": 0.01,
            }]))
        }
    }

    struct FakeValidator;
    #[async_trait]
    impl Validator for FakeValidator {
        async fn validate(&self, _dsl: &Value) -> Result<Value, RendererError> {
            Ok(serde_json::json!([{"valid": false, "errors": ["missing elements"], "warnings": [], "suggestions": ["Add at least one UI element"]}]))
        }
    }

    struct FakeStatusTool;
    #[async_trait]
    impl StatusTool for FakeStatusTool {
        async fn status(&self, task_id: &str, _include_result: bool) -> Result<Value, RendererError> {
            Ok(serde_json::json!([{"task_id": task_id, "status": "completed"}]))
        }
    }

    struct FakeTaskQueue;
    #[async_trait]
    impl TaskQueue for FakeTaskQueue {
        async fn submit(&self, _request: RenderTaskRequest, _connection_id: Option<ConnectionId>) -> Result<TaskId, RendererError> {
            Ok(TaskId::new())
        }
        async fn revoke(&self, _task_id: &TaskId) -> Result<bool, RendererError> {
            Ok(true)
        }
    }

    fn bridge() -> (Arc<ConnectionManager>, ToolBridge) {
        let store: Arc<dyn sse_store::SharedStore> = Arc::new(MemoryStore::new());
        let manager = ConnectionManager::new(store.clone(), "worker-1".into(), ManagerConfig::default());
        let tracker = Arc::new(TaskTracker::new(store));
        let bridge = ToolBridge::new(
            manager.clone(),
            Arc::new(FakeRenderer),
            Arc::new(FakeValidator),
            Arc::new(FakeStatusTool),
            Arc::new(FakeTaskQueue),
            tracker,
        );
        (manager, bridge)
    }

    #[tokio::test]
    async fn sync_render_succeeds() {
        let (manager, bridge) = bridge();
        let connection_id = manager.open(RequestContext::default(), None, None).await.unwrap();

        let mut arguments = Map::new();
        arguments.insert("dsl_content".into(), Value::String("{\"title\":\"t\"}".into()));
        arguments.insert("async_mode".into(), Value::Bool(false));
        let request = ToolRequest {
            tool_name: "render_ui_mockup".to_string(),
            arguments,
            connection_id,
            request_id: None,
            timeout_seconds: 60,
        };

        let response = bridge.execute(request).await.unwrap();
        assert!(response.success);
        assert!(response.events_sent > 0);
    }

    #[tokio::test]
    async fn unknown_tool_fails() {
        let (manager, bridge) = bridge();
        let connection_id = manager.open(RequestContext::default(), None, None).await.unwrap();
        let request = ToolRequest {
            tool_name: "not_a_tool".to_string(),
            arguments: Map::new(),
            connection_id,
            request_id: None,
            timeout_seconds: 60,
        };
        let response = bridge.execute(request).await.unwrap();
        assert!(!response.success);
    }

    #[tokio::test]
    async fn validate_dsl_reports_invalid_result() {
        let (manager, bridge) = bridge();
        let connection_id = manager.open(RequestContext::default(), None, None).await.unwrap();
        let mut arguments = Map::new();
        arguments.insert("dsl_content".into(), Value::String("{}".into()));
        let request = ToolRequest {
            tool_name: "validate_dsl".to_string(),
            arguments,
            connection_id,
            request_id: None,
            timeout_seconds: 60,
        };
        let response = bridge.execute(request).await.unwrap();
        assert!(response.success);
        assert_eq!(response.result.unwrap()["valid"], Value::Bool(false));
    }
}
