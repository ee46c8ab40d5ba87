use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to parse tool output for '{operation}': {detail}")]
    ToolParse { operation: String, detail: String },
}
