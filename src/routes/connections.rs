//! `GET/DELETE /sse/connections/{id}` and `GET /sse/stats`:
//! read-through to the Connection Manager's shared-store-backed table.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use sse_protocol::ConnectionId;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub async fn get_connection(
    State(state): State<AppState>,
    Path(id): Path<ConnectionId>,
) -> AppResult<Json<Value>> {
    let record = state
        .manager
        .connection(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no connection with id {id}")))?;
    Ok(Json(serde_json::to_value(record).unwrap_or(Value::Null)))
}

pub async fn close_connection(
    State(state): State<AppState>,
    Path(id): Path<ConnectionId>,
) -> AppResult<Json<Value>> {
    state.manager.close(id, "client_requested").await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Serialize)]
struct Stats {
    total_connections: u64,
    owned_connections: usize,
    worker_id: String,
}

pub async fn stats(State(state): State<AppState>) -> AppResult<Json<Stats>> {
    let total_connections = state.manager.connection_count().await?;
    Ok(Json(Stats {
        total_connections,
        owned_connections: state.manager.owned_connection_count(),
        worker_id: state.manager.worker_id().to_string(),
    }))
}
