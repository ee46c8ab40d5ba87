//! Route assembly for the SSE HTTP surface.

mod broadcast;
mod connections;
mod sse;
mod tools;

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use smg_auth::{control_plane_auth_middleware, PrincipalExt};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::state::AppState;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn router(state: AppState) -> Router {
    let cors = build_cors(&state.config.allowed_origins);
    let auth_state = state.auth.clone();

    Router::new()
        .route("/sse/connect", get(sse::connect))
        .route("/sse/tool", post(tools::execute_tool))
        .route("/sse/render", post(tools::render))
        .route("/sse/validate", post(tools::validate))
        .route("/sse/status", post(tools::status))
        .route(
            "/sse/connections/{id}",
            get(connections::get_connection).delete(connections::close_connection),
        )
        .route("/sse/stats", get(connections::stats))
        .route("/sse/broadcast", post(broadcast::broadcast))
        .route("/healthz", get(healthz))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(middleware::from_fn_with_state(auth_state, control_plane_auth_middleware))
        .layer(middleware::from_fn(propagate_request_id))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}

fn build_cors(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    }
    let origins: Vec<_> = allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Copies the `x-request-id` header `SetRequestIdLayer` assigns into a
/// [`smg_auth::RequestId`] extension, so the auth middleware's audit log
/// can correlate a denied request back to the same id the client sees.
async fn propagate_request_id(mut request: axum::extract::Request, next: Next) -> Response {
    if let Some(id) = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        request.extensions_mut().insert(smg_auth::RequestId(id.to_string()));
    }
    next.run(request).await
}

/// Throttles every authenticated request by the caller's network address
/// and principal, independently. Runs after the auth middleware so a
/// [`smg_auth::Principal`] is already in request extensions.
async fn rate_limit_middleware(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: axum::extract::Request,
    next: Next,
) -> Result<Response, AppError> {
    let client_ip = connect_info.map(|c| c.0.ip().to_string()).unwrap_or_else(|| "unknown".to_string());
    let principal = request
        .principal()
        .map(|p| p.subject.clone())
        .unwrap_or_else(|| "anonymous".to_string());

    match state.rate_limiter.check(&client_ip, &principal) {
        sse_bridge_core::RateLimitDecision::Exceeded => Err(AppError::RateLimited {
            retry_after_secs: state.rate_limiter.retry_after_secs(&client_ip),
        }),
        _ => Ok(next.run(request).await),
    }
}
