use thiserror::Error;

/// Failures from the external context backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures from a tool handler. Handler errors are fatal to the call and
/// count against the circuit breaker; an unknown tool name is not an error
/// at all.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("execution failed: {0}")]
    Failed(String),
}

pub type ToolResult<T> = Result<T, ToolError>;
