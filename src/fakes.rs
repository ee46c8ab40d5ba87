//! In-memory `Renderer`/`Validator`/`StatusTool`/`TaskQueue` implementations
//! used in `--dev` mode (no headless-browser pool or distributed queue
//! available) and by the integration tests. Production deployments supply
//! their own implementations of the four traits in
//! `sse_protocol::tools` — a real browser pool, a real DSL linter, a real
//! distributed queue — and wire them into [`crate::state::AppState`]
//! instead of these.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use sse_protocol::{
    ConnectionId, RenderOptions, RenderTaskRequest, Renderer, RendererError, StatusTool, TaskId,
    TaskQueue, TaskStatus, Validator,
};
use wfaas::TaskTracker;

/// Always succeeds, returning a 1x1 transparent PNG regardless of the DSL
/// content. Good enough to exercise the render pipeline's event sequence
/// and response shape without a real browser.
pub struct FakeRenderer;

const PLACEHOLDER_PNG_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNk+A8AAQUBAScY42YAAAAASUVORK5CYII=";

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render(&self, _dsl_content: &Value, options: &RenderOptions) -> Result<Value, RendererError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(json!([{
            "success": true,
            "png_result": {
                "base64_data": PLACEHOLDER_PNG_BASE64,
                "width": options.width,
                "height": options.height,
                "file_size": PLACEHOLDER_PNG_BASE64.len(),
                "metadata": {},
            },
            "processing_time": 0.02,
        }]))
    }
}

/// Accepts any DSL content that parses as a JSON object with a `type`
/// field; everything else is reported invalid.
pub struct FakeValidator;

#[async_trait]
impl Validator for FakeValidator {
    async fn validate(&self, dsl_content: &Value) -> Result<Value, RendererError> {
        let errors: Vec<Value> = match dsl_content.get("type") {
            Some(_) => vec![],
            None => vec![json!("missing required field: type")],
        };
        let valid = errors.is_empty();
        Ok(json!([{
            "success": true,
            "valid": valid,
            "errors": errors,
        }]))
    }
}

/// Reads task state back out of the shared [`TaskTracker`], in the same
/// dual-shape the tool bridge expects from a real status service.
pub struct FakeStatusTool {
    tracker: Arc<TaskTracker>,
}

impl FakeStatusTool {
    pub fn new(tracker: Arc<TaskTracker>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl StatusTool for FakeStatusTool {
    async fn status(&self, task_id: &str, include_result: bool) -> Result<Value, RendererError> {
        let id: TaskId = task_id
            .parse()
            .map_err(|_| RendererError::TaskNotFound(task_id.to_string()))?;
        let task = self
            .tracker
            .get(&id)
            .await
            .map_err(|e| RendererError::Internal(e.to_string()))?
            .ok_or_else(|| RendererError::TaskNotFound(task_id.to_string()))?;

        let mut body = serde_json::Map::new();
        body.insert("success".into(), Value::Bool(true));
        body.insert("task_id".into(), Value::String(task_id.to_string()));
        if let Some(status) = task.get("status") {
            body.insert("status".into(), status.clone());
        }
        if let Some(progress) = task.get("progress") {
            body.insert("progress".into(), progress.clone());
        }
        if let Some(message) = task.get("message") {
            body.insert("message".into(), message.clone());
        }
        if include_result {
            if let Some(result) = task.get("result") {
                body.insert("result".into(), result.clone());
            }
        }
        Ok(json!([body]))
    }
}

/// Submits a render as a detached background task that drives the task
/// through the tracker (pending -> processing -> completed/failed),
/// standing in for a real distributed queue and worker pool.
pub struct FakeTaskQueue {
    renderer: Arc<dyn Renderer>,
    tracker: Arc<TaskTracker>,
    cancelled: Mutex<HashMap<TaskId, Arc<AtomicBool>>>,
}

impl FakeTaskQueue {
    pub fn new(renderer: Arc<dyn Renderer>, tracker: Arc<TaskTracker>) -> Self {
        Self { renderer, tracker, cancelled: Mutex::new(HashMap::new()) }
    }
}

#[async_trait]
impl TaskQueue for FakeTaskQueue {
    async fn submit(
        &self,
        request: RenderTaskRequest,
        connection_id: Option<ConnectionId>,
    ) -> Result<TaskId, RendererError> {
        let task_id = TaskId::new();
        let flag = Arc::new(AtomicBool::new(false));
        self.cancelled.lock().insert(task_id, flag.clone());

        self.tracker
            .update(&task_id, TaskStatus::Pending, Some(0), None, None, connection_id)
            .await
            .map_err(|e| RendererError::Internal(e.to_string()))?;

        let renderer = Arc::clone(&self.renderer);
        let tracker = Arc::clone(&self.tracker);
        tokio::spawn(async move {
            run_fake_render(renderer, tracker, task_id, connection_id, flag, request).await;
        });

        Ok(task_id)
    }

    async fn revoke(&self, task_id: &TaskId) -> Result<bool, RendererError> {
        let flag = self.cancelled.lock().get(task_id).cloned();
        match flag {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                self.tracker
                    .update(task_id, TaskStatus::Cancelled, None, None, None, None)
                    .await
                    .map_err(|e| RendererError::Internal(e.to_string()))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

async fn run_fake_render(
    renderer: Arc<dyn Renderer>,
    tracker: Arc<TaskTracker>,
    task_id: TaskId,
    connection_id: Option<ConnectionId>,
    cancelled: Arc<AtomicBool>,
    request: RenderTaskRequest,
) {
    tokio::time::sleep(Duration::from_millis(50)).await;
    if cancelled.load(Ordering::SeqCst) {
        return;
    }
    let _ = tracker
        .update(
            &task_id,
            TaskStatus::Processing,
            Some(50),
            Some("rendering".to_string()),
            None,
            connection_id,
        )
        .await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    if cancelled.load(Ordering::SeqCst) {
        return;
    }

    match renderer.render(&request.dsl_content, &request.options).await {
        Ok(raw) => match sse_protocol::parse_tool_output(&raw, "render_ui_mockup") {
            Ok(result) => {
                let _ = tracker
                    .update(&task_id, TaskStatus::Completed, Some(100), None, Some(result), connection_id)
                    .await;
            }
            Err(err) => {
                let mut result = serde_json::Map::new();
                result.insert("error".into(), Value::String(err.to_string()));
                let _ = tracker
                    .update(&task_id, TaskStatus::Failed, None, None, Some(result), connection_id)
                    .await;
            }
        },
        Err(err) => {
            let mut result = serde_json::Map::new();
            result.insert("error".into(), Value::String(err.to_string()));
            let _ = tracker
                .update(&task_id, TaskStatus::Failed, None, None, Some(result), connection_id)
                .await;
        }
    }
}
