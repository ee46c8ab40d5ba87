//! Task Tracker: persists render task state in the shared store and
//! bridges background-worker progress into the SSE fan-out via the same
//! cross-worker pub/sub channel the Connection Manager's Pub/Sub Bridge
//! listens on.

pub mod error;
pub mod tracker;

pub use error::{TrackerError, TrackerResult};
pub use tracker::TaskTracker;
