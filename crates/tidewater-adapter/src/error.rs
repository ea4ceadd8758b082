//! Adapter error types.

use thiserror::Error;

use tidewater_core::CoreError;

use crate::phase::RequestPhase;

/// Result type alias for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Ways a single request can end without a complete response.
///
/// None of these affect other requests or the event loop; the server
/// closes the affected connection.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The event stream did not follow the protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The client went away before the request body was complete.
    #[error("client disconnected before the request body was complete")]
    Disconnected,

    /// The request body exceeded the configured limit.
    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// The downstream side stopped accepting response events.
    #[error("response cancelled by the server side")]
    Cancelled,

    /// A lazy body failed after part of the response was sent.
    #[error("response body producer failed: {0}")]
    Producer(anyhow::Error),

    #[error("invalid request phase transition: {from:?} -> {to:?}")]
    InvalidTransition { from: RequestPhase, to: RequestPhase },

    #[error(transparent)]
    Core(CoreError),
}

impl From<CoreError> for AdapterError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Disconnected => AdapterError::Cancelled,
            other => AdapterError::Core(other),
        }
    }
}
