//! Error types for the collaborative session layer.

use thiserror::Error;

use gridline_engine::EngineError;

/// Errors a caller of [`crate::Engine`] can observe synchronously. Anything
/// that arrives asynchronously over the wire instead surfaces as a
/// [`crate::events::SpreadsheetEvent`].
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("server rejected the request: {}", .0.join("; "))]
    ServerFailed(Vec<String>),

    #[error("socket error: {0}")]
    SocketError(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("not connected to a session")]
    NotConnected,

    #[error("unexpected server response")]
    GenericError,

    #[error("read/write error: {0}")]
    ReadWriteError(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
