//! The `error` module defines the error type used inside `chatwire`.
//!
//! Errors travel between the connector, the token source, endpoint resolution
//! and the storage backends. None of them cross the public messaging
//! contracts: the connection manager retries, the offline queue degrades and
//! the composer falls back to queueing.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("websocket handshake failed: {0}")]
    Handshake(#[from] tungstenite::Error),

    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("token source error: {0}")]
    Token(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("connection is not open")]
    NotOpen,

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sled::Error> for ChatError {
    fn from(err: sled::Error) -> Self {
        ChatError::Storage(err.to_string())
    }
}
