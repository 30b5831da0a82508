//! Error taxonomy shared across every component of the server.

use thiserror::Error;

/// Errors surfaced while servicing one connection or persisting one batch.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("connection closed by peer before the expected bytes arrived")]
    ConnectionClosed,

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(String),
}

pub type ServerResult<T> = Result<T, ServerError>;
