//! Connection manager, cross-worker pub/sub bridge, and tool-execution
//! bridge for the SSE render service.
//!
//! ## Modules
//!
//! - [`core`]: connection lifecycle, local queues, heartbeat and cleanup
//! - [`pubsub`]: cross-worker event delivery over the shared store
//! - [`tool_bridge`]: MCP tool dispatch (render/validate/status) over SSE
//! - [`rate_limit`]: per-IP and per-API-key request throttling

pub mod error;
pub mod rate_limit;

pub mod core;
pub mod pubsub;
pub mod tool_bridge;

pub use core::{ConnectionManager, ManagerConfig, RequestContext};
pub use error::{BridgeError, BridgeResult};
pub use pubsub::PubSubBridge;
pub use rate_limit::{RateLimitDecision, RateLimiter, RateLimiterConfig};
pub use tool_bridge::{ToolBridge, ToolResponse};
