use agora_gateway::GatewayError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Input rejected before anything was sent to the backend.
    #[error("{0}")]
    Validation(String),

    #[error("not signed in")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("stream is closed")]
    StreamClosed,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("malformed document: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl ClientError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
