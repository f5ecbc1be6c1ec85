use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredError {
    #[error("token expired")]
    Expired,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("delegation rejected: {0}")]
    DelegationRejected(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),
}

pub type CredResult<T> = Result<T, CredError>;
