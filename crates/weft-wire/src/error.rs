use thiserror::Error;

use crate::status::Status;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("rpc failed: {0}")]
    Rpc(Status),
}

impl From<Status> for WireError {
    fn from(status: Status) -> Self {
        WireError::Rpc(status)
    }
}

pub type WireResult<T> = Result<T, WireError>;
