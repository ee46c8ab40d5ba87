//! `POST /sse/broadcast`: fans an operator-supplied event out to every
//! connection in the shared table, not just the ones this worker owns
//! locally.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sse_protocol::EventType;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    event_type: String,
    #[serde(default)]
    data: Map<String, Value>,
}

pub async fn broadcast(
    State(state): State<AppState>,
    Json(body): Json<BroadcastRequest>,
) -> AppResult<Json<Value>> {
    let kind = EventType::parse(&body.event_type)
        .ok_or_else(|| AppError::BadRequest(format!("unknown event type {}", body.event_type)))?;

    let sent_count = state.manager.broadcast(kind, body.data).await;
    Ok(Json(json!({ "success": true, "sent_count": sent_count })))
}
