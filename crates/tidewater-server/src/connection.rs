//! Per-request glue between hyper and the protocol event stream.

use std::convert::Infallible;
use std::sync::Arc;

use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use tidewater_core::{Application, Connection, InboundEvent, OutboundEvent, RequestHead};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::body::OutboundBody;
use crate::convert::{ConnInfo, declared_length, headers_to_http, request_head, status_from_u16};

/// What every request on a listener shares.
pub(crate) struct Dispatch {
    pub app: Arc<dyn Application>,
    pub event_buffer: usize,
    pub root_path: String,
}

/// Serve one HTTP request through the application.
///
/// The request body is fed to the application from its own task while
/// the application runs, so large uploads are never buffered here. The
/// response is returned as soon as the application emits `Start`; its
/// body then follows the remaining outbound events.
pub(crate) async fn serve_request(
    dispatch: Arc<Dispatch>,
    info: ConnInfo,
    req: Request<Incoming>,
) -> Result<Response<OutboundBody>, Infallible> {
    let (parts, body) = req.into_parts();
    let mut head = request_head(&parts, info);
    head.root_path.clone_from(&dispatch.root_path);
    debug!(method = %head.method, path = %head.raw_path, client = %info.client, "request");

    let (conn, peer) = Connection::channel(dispatch.event_buffer);
    let (inbound, mut outbound) = peer.into_split();

    tokio::spawn(feed_body(inbound, head, body));
    let app = dispatch.app.clone();
    tokio::spawn(async move {
        if let Err(e) = app.call(conn).await {
            debug!(error = %e, "application finished with error");
        }
    });

    match outbound.recv().await {
        Some(OutboundEvent::Start { status, headers }) => {
            let length = declared_length(&headers);
            let mut response = Response::new(OutboundBody::new(outbound, length));
            *response.status_mut() = status_from_u16(status);
            *response.headers_mut() = headers_to_http(headers);
            Ok(response)
        }
        Some(other) => {
            error!(event = ?other, "application sent a body event before the response start");
            Ok(internal_error())
        }
        None => {
            error!("application finished without starting a response");
            Ok(internal_error())
        }
    }
}

fn internal_error() -> Response<OutboundBody> {
    let mut response = Response::new(OutboundBody::full("Internal Server Error"));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

/// Deliver `Connect`, the body frames and then `BodyComplete`.
///
/// A body read error means the client went away mid-request and is
/// reported as `Disconnect`. Stops quietly once the application no
/// longer listens.
async fn feed_body(inbound: mpsc::Sender<InboundEvent>, head: RequestHead, mut body: Incoming) {
    if inbound.send(InboundEvent::Connect(head)).await.is_err() {
        return;
    }

    loop {
        let event = match body.frame().await {
            Some(Ok(frame)) => match frame.into_data() {
                Ok(data) if data.is_empty() => continue,
                Ok(data) => InboundEvent::Body(data),
                // Trailers carry no body bytes.
                Err(_) => continue,
            },
            Some(Err(e)) => {
                debug!(error = %e, "client disconnected while sending body");
                let _ = inbound.send(InboundEvent::Disconnect).await;
                return;
            }
            None => InboundEvent::BodyComplete,
        };

        let done = event == InboundEvent::BodyComplete;
        if inbound.send(event).await.is_err() || done {
            return;
        }
    }
}
