//! The HTTP-facing error envelope for the SSE surface: a status-code-
//! specific constructor per error class, a custom error-code response
//! header, and a small JSON body. Request correlation (`x-request-id`) is
//! attached by the `tower_http` request-id layers in
//! [`crate::routes::router`], not by this type.

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use serde_json::Value;
use sse_bridge_core::BridgeError;
use sse_store::StoreError;
use wfaas::TrackerError;

pub const HEADER_ERROR_CODE: HeaderName = HeaderName::from_static("x-sse-error-code");

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    #[error("SSE surface disabled")]
    ServiceDisabled,

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    error_code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

fn respond(status: StatusCode, code: &'static str, message: String, details: Option<Value>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(HEADER_ERROR_CODE, HeaderValue::from_static(code));
    let body = Json(ErrorBody { error: message, error_code: code, details });
    (status, headers, body).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound(msg) => respond(StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
            AppError::BadRequest(msg) => respond(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),
            AppError::RateLimited { retry_after_secs } => {
                let mut headers = HeaderMap::new();
                headers.insert(HEADER_ERROR_CODE, HeaderValue::from_static("RATE_LIMIT_EXCEEDED"));
                if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                    headers.insert(axum::http::header::RETRY_AFTER, value);
                }
                let body = Json(ErrorBody {
                    error: "rate limit exceeded".to_string(),
                    error_code: "RATE_LIMIT_EXCEEDED",
                    details: None,
                });
                (StatusCode::TOO_MANY_REQUESTS, headers, body).into_response()
            }
            AppError::ServiceDisabled => respond(
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                "the SSE surface is disabled on this worker".to_string(),
                None,
            ),
            AppError::Bridge(err) => bridge_response(err),
            AppError::Tracker(err) => tracker_response(err),
        }
    }
}

fn bridge_response(err: BridgeError) -> Response {
    let status = match &err {
        BridgeError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        BridgeError::ConnectionNotFound(_) => StatusCode::NOT_FOUND,
        BridgeError::UnknownTool(_)
        | BridgeError::InvalidArguments(_)
        | BridgeError::ValidationError(_) => StatusCode::BAD_REQUEST,
        BridgeError::ToolTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        BridgeError::ToolParse { .. } => StatusCode::BAD_GATEWAY,
        BridgeError::BrowserPoolUnavailable(_) | BridgeError::BrowserPoolExhausted(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        BridgeError::ConnectionBackpressure(_) => StatusCode::CONFLICT,
        BridgeError::ResultSerialize(_) | BridgeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    respond(status, err.code(), err.to_string(), None)
}

fn tracker_response(err: TrackerError) -> Response {
    let (status, code) = match &err {
        TrackerError::StoreUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE"),
        TrackerError::TaskNotFound(_) => (StatusCode::NOT_FOUND, "TASK_NOT_FOUND"),
        TrackerError::ResultSerialize(_) => (StatusCode::INTERNAL_SERVER_ERROR, "RESULT_SERIALIZE_ERROR"),
    };
    respond(status, code, err.to_string(), None)
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Bridge(BridgeError::StoreUnavailable(err))
    }
}
