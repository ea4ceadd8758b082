//! `SyncAdapter`: serves a blocking [`Handler`] as an async [`Application`].

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tidewater_core::{
    AdapterConfig, Application, Body, BoxFuture, Chunks, Connection, HeaderMap, InboundEvent,
    OutboundEvent, Request, RequestHead, Response,
};
use tracing::{debug, error, warn};

use crate::error::{AdapterError, AdapterResult};
use crate::handler::Handler;
use crate::phase::RequestPhase;
use crate::pump;

/// Adapter exposing a synchronous [`Handler`] through the protocol event
/// stream.
///
/// For each request it assembles the full body, runs the handler on the
/// blocking pool, and re-emits the response:
///
/// - fixed bodies go out with `content-length` and no chunked framing;
/// - lazy bodies go out with `transfer-encoding: chunked`, pulled and
///   forwarded one chunk at a time.
pub struct SyncAdapter<H> {
    handler: Arc<H>,
    config: AdapterConfig,
}

impl<H> Clone for SyncAdapter<H> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            config: self.config.clone(),
        }
    }
}

impl<H: Handler> SyncAdapter<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
            config: AdapterConfig::default(),
        }
    }

    /// Fails when `config` does not validate, e.g. a zero `chunk_size`.
    pub fn with_config(handler: H, config: AdapterConfig) -> AdapterResult<Self> {
        config.validate()?;
        Ok(Self {
            handler: Arc::new(handler),
            config,
        })
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Serve one request over `conn`.
    ///
    /// Handler failures are answered with a 500 and count as success
    /// here. Errors are returned only when the response could not be
    /// completed: the client left early, the body producer failed, or
    /// the event stream was malformed.
    pub async fn handle(&self, mut conn: Connection) -> AdapterResult<()> {
        let phase = RequestPhase::AwaitingHeaders;

        let head = match conn.receive().await {
            Some(InboundEvent::Connect(head)) => head,
            Some(InboundEvent::Disconnect) | None => return Err(AdapterError::Disconnected),
            Some(other) => {
                return Err(AdapterError::Protocol(format!(
                    "expected connect event, got {other:?}"
                )));
            }
        };
        let phase = phase.advance(RequestPhase::AwaitingBody)?;

        let body = match self.read_body(&mut conn).await {
            Ok(body) => body,
            Err(AdapterError::BodyTooLarge { limit }) => {
                warn!(
                    method = %head.method,
                    path = %head.path,
                    limit,
                    "request body too large"
                );
                phase.advance(RequestPhase::Closed)?;
                let resp = Response::text(413, "Payload Too Large").with_header("connection", "close");
                return self.send_response(&conn, resp).await.map(|_| ());
            }
            Err(e) => {
                debug!(method = %head.method, path = %head.path, error = %e, "request aborted");
                phase.advance(RequestPhase::Closed)?;
                return Err(e);
            }
        };

        let phase = phase.advance(RequestPhase::Dispatched)?;
        let response = self.dispatch(head, body).await;

        let phase = phase.advance(RequestPhase::Responding)?;
        let result = self.send_response(&conn, response).await;
        phase.advance(RequestPhase::Closed)?;

        result.map(|_| ())
    }

    /// Concatenate body fragments until the body-complete marker.
    async fn read_body(&self, conn: &mut Connection) -> AdapterResult<Bytes> {
        let mut buf = BytesMut::new();
        loop {
            match conn.receive().await {
                Some(InboundEvent::Body(chunk)) => {
                    if let Some(limit) = self.config.max_body_bytes {
                        if buf.len() + chunk.len() > limit {
                            return Err(AdapterError::BodyTooLarge { limit });
                        }
                    }
                    buf.extend_from_slice(&chunk);
                }
                Some(InboundEvent::BodyComplete) => return Ok(buf.freeze()),
                Some(InboundEvent::Disconnect) | None => return Err(AdapterError::Disconnected),
                Some(InboundEvent::Connect(_)) => {
                    return Err(AdapterError::Protocol("duplicate connect event".to_string()));
                }
            }
        }
    }

    /// Run the handler on the blocking pool.
    ///
    /// Errors and panics are logged and replaced by a bare 500.
    async fn dispatch(&self, head: RequestHead, body: Bytes) -> Response {
        let method = head.method.clone();
        let path = head.path.clone();
        let request = Request::from_head(head, body);
        let handler = self.handler.clone();

        match tokio::task::spawn_blocking(move || handler.handle(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                error!(%method, %path, error = %e, "request handler failed");
                internal_error()
            }
            Err(e) => {
                error!(%method, %path, error = %e, "request handler panicked");
                internal_error()
            }
        }
    }

    /// Emit `response` as protocol events. Returns the body bytes sent.
    async fn send_response(&self, conn: &Connection, response: Response) -> AdapterResult<u64> {
        let (status, mut headers, body) = response.into_parts();
        match body {
            Body::Full(bytes) => {
                frame_fixed(&mut headers, bytes.len());
                conn.send(OutboundEvent::Start { status, headers }).await?;

                let len = bytes.len() as u64;
                for chunk in Chunks::new(bytes, self.config.chunk_size) {
                    conn.send(OutboundEvent::Body(chunk)).await?;
                }
                conn.send(OutboundEvent::End).await?;
                Ok(len)
            }
            Body::Lazy(lazy) => {
                frame_chunked(&mut headers);
                // On failure the producer is dropped here, before any pull.
                conn.send(OutboundEvent::Start { status, headers }).await?;
                pump::stream_lazy(conn, lazy).await
            }
        }
    }
}

impl<H: Handler> Application for SyncAdapter<H> {
    fn call(&self, connection: Connection) -> BoxFuture<anyhow::Result<()>> {
        let adapter = self.clone();
        Box::pin(async move { adapter.handle(connection).await.map_err(Into::into) })
    }
}

/// Headers for a body of known length.
fn frame_fixed(headers: &mut HeaderMap, len: usize) {
    headers.remove("transfer-encoding");
    headers.set("content-length", len.to_string());
}

/// Headers for a body of unknown length.
fn frame_chunked(headers: &mut HeaderMap) {
    headers.remove("content-length");
    headers.set("transfer-encoding", "chunked");
}

fn internal_error() -> Response {
    Response::text(500, "Internal Server Error")
}
