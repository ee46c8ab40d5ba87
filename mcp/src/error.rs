//! Bridge error types.
//!
//! One enum covering the connection manager, pub/sub bridge, and tool
//! bridge; variants map 1:1 onto the error taxonomy the root crate's
//! `AppError` surfaces as HTTP status codes and/or SSE events.

use sse_protocol::RendererError;
use sse_store::StoreError;
use thiserror::Error;

pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("shared store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("tool timed out: {0}")]
    ToolTimeout(String),

    #[error("failed to parse tool output for {operation}: {detail}")]
    ToolParse { operation: String, detail: String },

    #[error("browser pool unavailable: {0}")]
    BrowserPoolUnavailable(String),

    #[error("browser pool exhausted: {0}")]
    BrowserPoolExhausted(String),

    #[error("connection closed due to backpressure: {0}")]
    ConnectionBackpressure(String),

    #[error("result could not be serialized: {0}")]
    ResultSerialize(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sse_protocol::ProtocolError> for BridgeError {
    fn from(err: sse_protocol::ProtocolError) -> Self {
        match err {
            sse_protocol::ProtocolError::ToolParse { operation, detail } => {
                BridgeError::ToolParse { operation, detail }
            }
        }
    }
}

impl From<RendererError> for BridgeError {
    fn from(err: RendererError) -> Self {
        match err {
            RendererError::Timeout(msg) => BridgeError::ToolTimeout(msg),
            RendererError::BrowserPoolUnavailable(msg) => BridgeError::BrowserPoolUnavailable(msg),
            RendererError::BrowserPoolExhausted(msg) => BridgeError::BrowserPoolExhausted(msg),
            RendererError::Validation(msg) => BridgeError::ValidationError(msg),
            RendererError::TaskNotFound(msg) => BridgeError::InvalidArguments(msg),
            RendererError::Internal(msg) => BridgeError::Internal(msg),
        }
    }
}

impl BridgeError {
    /// The `code` string carried in `connection.error` / `mcp.tool.error`
    /// event payloads.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            BridgeError::ConnectionNotFound(_) => "CONNECTION_NOT_FOUND",
            BridgeError::UnknownTool(_) => "UNKNOWN_TOOL",
            BridgeError::InvalidArguments(_) => "INVALID_ARGUMENTS",
            BridgeError::ValidationError(_) => "VALIDATION_ERROR",
            BridgeError::ToolTimeout(_) => "TOOL_EXECUTION_ERROR",
            BridgeError::ToolParse { .. } => "TOOL_PARSE_ERROR",
            BridgeError::BrowserPoolUnavailable(_) => "BROWSER_POOL_UNAVAILABLE",
            BridgeError::BrowserPoolExhausted(_) => "BROWSER_POOL_EXHAUSTED",
            BridgeError::ConnectionBackpressure(_) => "CONNECTION_BACKPRESSURE",
            BridgeError::ResultSerialize(_) => "RESULT_SERIALIZE_ERROR",
            BridgeError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
