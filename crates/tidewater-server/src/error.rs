//! Server error types.

use thiserror::Error;
use tidewater_core::CoreError;

/// Result type alias for server control operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors surfaced by the lifecycle wrapper.
///
/// Failures on the event-loop thread are never propagated across the
/// thread boundary; they are recorded as the server's final error and
/// read back with [`Server::final_error`](crate::Server::final_error).
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server has already been started")]
    AlreadyStarted,

    #[error("invalid server config: {0}")]
    Config(#[from] CoreError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("failed to build event loop: {0}")]
    Runtime(std::io::Error),

    #[error("failed to spawn server thread: {0}")]
    Spawn(std::io::Error),

    #[error("event loop panicked: {0}")]
    Panicked(String),
}

/// Errors yielded by a response body being streamed to the client.
///
/// Either one makes hyper abort the connection, which is how a client
/// learns that a chunked body was cut short.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("response ended without an end marker")]
    Truncated,

    #[error("response start emitted twice")]
    DuplicateStart,
}
