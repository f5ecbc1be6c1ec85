use thiserror::Error;

#[derive(Debug, Error)]
pub enum WeftError {
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("credential error: {0}")]
    Cred(#[from] weft_cred::CredError),

    #[error("store error: {0}")]
    Store(#[from] weft_context::StoreError),

    #[error("transport error: {0}")]
    Wire(#[from] weft_wire::WireError),
}

pub type WeftResult<T> = Result<T, WeftError>;
