//! Shared protocol types for the SSE render bridge: the event model and
//! wire format, the dual-shape tool output parser, and the data-model types
//! (`Connection`, `Task`, `ToolRequest`) that the storage, bridge, and
//! HTTP-surface crates all build on.

pub mod connection;
pub mod error;
pub mod event;
pub mod ids;
pub mod render;
pub mod task;
pub mod tool_output;
pub mod tool_request;
pub mod tools;

pub use connection::{Connection, ConnectionStatus};
pub use error::ProtocolError;
pub use event::{format_wire, new_event, Event, EventType};
pub use ids::{ConnectionId, EventId, RequestId, TaskId};
pub use render::{RenderOptions, RenderTaskRequest};
pub use task::{Task, TaskStatus, TASK_TTL_SECONDS};
pub use tool_output::{parse_tool_output, ToolOutput};
pub use tool_request::{ToolName, ToolRequest};
pub use tools::{Renderer, RendererError, StatusTool, TaskQueue, Validator};
