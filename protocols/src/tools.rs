//! Trait boundary for the external collaborators the tool bridge drives:
//! the headless-browser renderer, the DSL validator, the status reader,
//! and the background task queue. Production implementations of these
//! traits (a real browser pool, a real distributed queue) live outside
//! this workspace; only the trait objects and fakes for testing live
//! here.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::ids::{ConnectionId, TaskId};
use crate::render::{RenderOptions, RenderTaskRequest};

#[derive(Debug, Error)]
pub enum RendererError {
    #[error("render timed out: {0}")]
    Timeout(String),
    #[error("browser pool unavailable: {0}")]
    BrowserPoolUnavailable(String),
    #[error("browser pool exhausted: {0}")]
    BrowserPoolExhausted(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, dsl_content: &Value, options: &RenderOptions) -> Result<Value, RendererError>;
}

#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, dsl_content: &Value) -> Result<Value, RendererError>;
}

#[async_trait]
pub trait StatusTool: Send + Sync {
    async fn status(&self, task_id: &str, include_result: bool) -> Result<Value, RendererError>;
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn submit(
        &self,
        request: RenderTaskRequest,
        connection_id: Option<ConnectionId>,
    ) -> Result<TaskId, RendererError>;

    async fn revoke(&self, task_id: &TaskId) -> Result<bool, RendererError>;
}
