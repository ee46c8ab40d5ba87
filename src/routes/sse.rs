//! `GET /sse/connect`: opens the SSE stream by delegating to the
//! Connection Manager for the connection lifecycle and replay, then wraps
//! its frame stream in a `text/event-stream` response.

use std::hash::{Hash, Hasher};
use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use serde::Deserialize;
use smg_auth::PrincipalExt;
use sse_bridge_core::RequestContext;
use sse_protocol::EventId;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

const LAST_EVENT_ID_HEADER: &str = "last-event-id";
const CONNECTION_ID_HEADER: &str = "x-sse-connection-id";

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    client_id: Option<String>,
}

pub async fn connect(
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    request: axum::extract::Request,
) -> AppResult<Response> {
    if !state.config.sse_enabled {
        return Err(AppError::ServiceDisabled);
    }

    let client_addr = connect_info.map(|c| c.0.ip().to_string()).unwrap_or_else(|| "unknown".to_string());
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let credential_hash = request.principal().map(|p| fast_hash(&p.subject));

    let last_event_id = headers
        .get(LAST_EVENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<EventId>().ok());

    let ctx = RequestContext { client_addr, user_agent, credential_hash };
    let connection_id = state.manager.open(ctx, query.client_id, last_event_id).await?;

    let frames = state.manager.stream(connection_id).map(Ok::<_, std::convert::Infallible>);
    let body = Body::from_stream(frames);

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        HeaderName::from_static(CONNECTION_ID_HEADER),
        HeaderValue::from_str(&connection_id.to_string()).expect("uuid is valid header value"),
    );

    Ok(response.into_response())
}

/// Deliberately a fast, non-cryptographic hash, not a password-grade one:
/// this is for audit-log correlation, not secret storage.
fn fast_hash(value: &str) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    value.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
