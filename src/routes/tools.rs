//! `POST /sse/tool` and its three convenience wrappers: each builds a
//! [`ToolRequest`] and hands it to the Tool Bridge, which emits the SSE
//! event sequence on the connection that submitted it.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{Map, Value};
use sse_protocol::{ConnectionId, ToolName, ToolRequest};
use validator::Validate;

use sse_bridge_core::ToolResponse;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub async fn execute_tool(
    State(state): State<AppState>,
    Json(request): Json<ToolRequest>,
) -> AppResult<Json<ToolResponse>> {
    run(&state, request).await
}

#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    connection_id: ConnectionId,
    dsl_content: Value,
    #[serde(default)]
    options: Option<Value>,
    #[serde(default)]
    async_mode: bool,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default = "default_timeout")]
    timeout_seconds: u32,
}

pub async fn render(
    State(state): State<AppState>,
    Json(body): Json<RenderRequest>,
) -> AppResult<Json<ToolResponse>> {
    let mut arguments = Map::new();
    arguments.insert("dsl_content".into(), body.dsl_content);
    arguments.insert("async_mode".into(), Value::Bool(body.async_mode));
    if let Some(options) = body.options {
        arguments.insert("options".into(), options);
    }

    let request = ToolRequest {
        tool_name: ToolName::RenderUiMockup.as_str().to_string(),
        arguments,
        connection_id: body.connection_id,
        request_id: body.request_id,
        timeout_seconds: body.timeout_seconds,
    };
    run(&state, request).await
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    connection_id: ConnectionId,
    dsl_content: Value,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default = "default_timeout")]
    timeout_seconds: u32,
}

pub async fn validate(
    State(state): State<AppState>,
    Json(body): Json<ValidateRequest>,
) -> AppResult<Json<ToolResponse>> {
    let mut arguments = Map::new();
    arguments.insert("dsl_content".into(), body.dsl_content);

    let request = ToolRequest {
        tool_name: ToolName::ValidateDsl.as_str().to_string(),
        arguments,
        connection_id: body.connection_id,
        request_id: body.request_id,
        timeout_seconds: body.timeout_seconds,
    };
    run(&state, request).await
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    connection_id: ConnectionId,
    task_id: String,
    #[serde(default)]
    include_result: bool,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default = "default_timeout")]
    timeout_seconds: u32,
}

pub async fn status(
    State(state): State<AppState>,
    Json(body): Json<StatusRequest>,
) -> AppResult<Json<ToolResponse>> {
    let mut arguments = Map::new();
    arguments.insert("task_id".into(), Value::String(body.task_id));
    arguments.insert("include_result".into(), Value::Bool(body.include_result));

    let request = ToolRequest {
        tool_name: ToolName::GetRenderStatus.as_str().to_string(),
        arguments,
        connection_id: body.connection_id,
        request_id: body.request_id,
        timeout_seconds: body.timeout_seconds,
    };
    run(&state, request).await
}

fn default_timeout() -> u32 {
    300
}

async fn run(state: &AppState, request: ToolRequest) -> AppResult<Json<ToolResponse>> {
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    if state.manager.connection(request.connection_id).await?.is_none() {
        return Err(AppError::NotFound(format!(
            "no connection with id {}",
            request.connection_id
        )));
    }

    let response = state.tool_bridge.execute(request).await?;
    Ok(Json(response))
}
