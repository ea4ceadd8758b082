//! The synchronous handler contract.

use tidewater_core::{Request, Response};

/// A blocking request handler.
///
/// `handle` runs on a worker thread, never on the event loop, so it may
/// block on file I/O or do CPU-bound work. It returns exactly one
/// [`Response`]; an `Err` becomes a `500 Internal Server Error` without
/// exposing the error to the client.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, request: Request) -> anyhow::Result<Response>;
}

impl<F> Handler for F
where
    F: Fn(Request) -> anyhow::Result<Response> + Send + Sync + 'static,
{
    fn handle(&self, request: Request) -> anyhow::Result<Response> {
        self(request)
    }
}
