//! Tool request: the typed payload the Tool Bridge dispatches on.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

use crate::ids::ConnectionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    RenderUiMockup,
    ValidateDsl,
    GetRenderStatus,
}

impl ToolName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RenderUiMockup => "render_ui_mockup",
            Self::ValidateDsl => "validate_dsl",
            Self::GetRenderStatus => "get_render_status",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "render_ui_mockup" => Some(Self::RenderUiMockup),
            "validate_dsl" => Some(Self::ValidateDsl),
            "get_render_status" => Some(Self::GetRenderStatus),
            _ => None,
        }
    }
}

fn default_timeout() -> u32 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ToolRequest {
    /// Raw tool name string; validated against the closed set by the
    /// Tool Bridge dispatcher (an unknown name fails with
    /// `ErrorKind::UnknownTool` rather than at deserialization, so the
    /// bridge can emit the usual SSE error sequence instead of a bare
    /// HTTP 400).
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    pub connection_id: ConnectionId,
    #[serde(default)]
    pub request_id: Option<String>,
    #[validate(range(min = 10, max = 600))]
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u32,
}
