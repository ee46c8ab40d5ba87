//! Task Tracker error types.

use sse_store::StoreError;
use thiserror::Error;

pub type TrackerResult<T> = Result<T, TrackerError>;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("shared store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("result could not be serialized: {0}")]
    ResultSerialize(String),
}
