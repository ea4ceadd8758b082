//! Protocol event stream between the async server and an application.
//!
//! Each request is delivered as an ordered sequence of inbound events and
//! answered with an ordered sequence of outbound events:
//!
//! ```text
//! server ──▶ application:  Connect(head) → Body* → BodyComplete | Disconnect
//! application ──▶ server:  Start(status, headers) → Body* → End
//! ```
//!
//! An outbound sequence that stops without `End` is a truncated response;
//! the server aborts the connection instead of terminating the body.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{CoreError, CoreResult};
use crate::header::HeaderMap;

/// Boxed future returned by [`Application::call`].
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Request metadata carried by the connect event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    /// Prefix the application is mounted under, e.g. `/api`. Empty at the root.
    pub root_path: String,
    /// Decoded path.
    pub path: String,
    /// Path as sent on the wire.
    pub raw_path: String,
    /// Query string without the leading `?`.
    pub query_string: String,
    pub headers: HeaderMap,
    pub http_version: String,
    pub scheme: String,
    pub client: Option<SocketAddr>,
    pub server: Option<SocketAddr>,
}

impl Default for RequestHead {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            root_path: String::new(),
            path: "/".to_string(),
            raw_path: "/".to_string(),
            query_string: String::new(),
            headers: HeaderMap::new(),
            http_version: "HTTP/1.1".to_string(),
            scheme: "http".to_string(),
            client: None,
            server: None,
        }
    }
}

/// Events delivered to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Request line and headers. Always the first event.
    Connect(RequestHead),
    /// A fragment of the request body.
    Body(Bytes),
    /// The request body is complete.
    BodyComplete,
    /// The client went away.
    Disconnect,
}

/// Events emitted by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    /// Status and final header set. Sent exactly once, first.
    Start { status: u16, headers: HeaderMap },
    /// A non-empty fragment of the response body.
    Body(Bytes),
    /// The response body is complete.
    End,
}

/// The application's end of a request's event stream.
#[derive(Debug)]
pub struct Connection {
    inbound: mpsc::Receiver<InboundEvent>,
    outbound: mpsc::Sender<OutboundEvent>,
}

impl Connection {
    /// Create a connected pair with `capacity` buffered events per direction.
    pub fn channel(capacity: usize) -> (Connection, ConnectionPeer) {
        let (in_tx, in_rx) = mpsc::channel(capacity);
        let (out_tx, out_rx) = mpsc::channel(capacity);
        (
            Connection {
                inbound: in_rx,
                outbound: out_tx,
            },
            ConnectionPeer {
                inbound: in_tx,
                outbound: out_rx,
            },
        )
    }

    /// Receive the next inbound event.
    ///
    /// Returns `None` once the server side is gone, which callers should
    /// treat like [`InboundEvent::Disconnect`].
    pub async fn receive(&mut self) -> Option<InboundEvent> {
        self.inbound.recv().await
    }

    /// Emit an outbound event, waiting for buffer space.
    pub async fn send(&self, event: OutboundEvent) -> CoreResult<()> {
        self.outbound
            .send(event)
            .await
            .map_err(|_| CoreError::Disconnected)
    }

    /// Whether the server side stopped listening for outbound events.
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    /// Resolves when the server side stops listening for outbound events.
    pub async fn closed(&self) {
        self.outbound.closed().await
    }
}

/// The server's end of a request's event stream.
#[derive(Debug)]
pub struct ConnectionPeer {
    inbound: mpsc::Sender<InboundEvent>,
    outbound: mpsc::Receiver<OutboundEvent>,
}

impl ConnectionPeer {
    pub async fn send(&self, event: InboundEvent) -> CoreResult<()> {
        self.inbound
            .send(event)
            .await
            .map_err(|_| CoreError::Disconnected)
    }

    /// Receive the next outbound event. `None` means the application
    /// dropped its end.
    pub async fn receive(&mut self) -> Option<OutboundEvent> {
        self.outbound.recv().await
    }

    /// Split into the inbound sender and outbound receiver so that request
    /// feeding and response reading can run in separate tasks.
    pub fn into_split(self) -> (mpsc::Sender<InboundEvent>, mpsc::Receiver<OutboundEvent>) {
        (self.inbound, self.outbound)
    }
}

/// An asynchronous application driven by protocol events.
///
/// The server calls [`Application::call`] once per request and runs the
/// returned future on its event loop.
pub trait Application: Send + Sync + 'static {
    fn call(&self, connection: Connection) -> BoxFuture<anyhow::Result<()>>;
}
