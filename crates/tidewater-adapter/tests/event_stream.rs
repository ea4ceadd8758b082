//! Driving `SyncAdapter` through the `Application` event interface.

use std::time::{Duration, Instant};

use bytes::Bytes;
use tidewater_adapter::SyncAdapter;
use tidewater_core::{
    Application, Connection, ConnectionPeer, HeaderMap, InboundEvent, OutboundEvent, Request,
    RequestHead, Response,
};

fn head(path: &str, query: &str) -> RequestHead {
    RequestHead {
        method: "POST".to_string(),
        path: path.to_string(),
        raw_path: path.to_string(),
        query_string: query.to_string(),
        ..RequestHead::default()
    }
}

async fn request(peer: &ConnectionPeer, head: RequestHead, body: &[&str]) {
    peer.send(InboundEvent::Connect(head)).await.unwrap();
    for part in body {
        peer.send(InboundEvent::Body(Bytes::copy_from_slice(part.as_bytes())))
            .await
            .unwrap();
    }
    peer.send(InboundEvent::BodyComplete).await.unwrap();
}

/// Collect the status and concatenated body of a finished response.
async fn response(peer: &mut ConnectionPeer) -> (u16, HeaderMap, Vec<u8>) {
    let (status, headers) = match peer.receive().await {
        Some(OutboundEvent::Start { status, headers }) => (status, headers),
        other => panic!("expected start, got {other:?}"),
    };
    let mut body = Vec::new();
    loop {
        match peer.receive().await {
            Some(OutboundEvent::Body(chunk)) => body.extend_from_slice(&chunk),
            Some(OutboundEvent::End) => return (status, headers, body),
            other => panic!("unexpected event {other:?}"),
        }
    }
}

fn echo(req: Request) -> anyhow::Result<Response> {
    let name = req.query().get("name").unwrap_or("anonymous").to_string();
    Ok(Response::text(200, format!("{name}:{}", req.text())))
}

#[tokio::test(flavor = "multi_thread")]
async fn requests_on_separate_streams_are_isolated() {
    let app = SyncAdapter::new(echo);

    let mut peers = Vec::new();
    let mut calls = Vec::new();
    for i in 0..10 {
        let (conn, peer) = Connection::channel(8);
        calls.push(tokio::spawn(app.call(conn)));
        peers.push((i, peer));
    }

    for (i, peer) in &peers {
        let name = format!("name=client{i}");
        request(peer, head("/", &name), &["part-a-", &i.to_string()]).await;
    }

    for (i, mut peer) in peers {
        let (status, _, body) = response(&mut peer).await;
        assert_eq!(status, 200);
        assert_eq!(String::from_utf8(body).unwrap(), format!("client{i}:part-a-{i}"));
    }
    for call in calls {
        call.await.unwrap().unwrap();
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn blocking_handler_does_not_stall_other_requests() {
    let app = SyncAdapter::new(|req: Request| -> anyhow::Result<Response> {
        if req.path() == "/slow" {
            std::thread::sleep(Duration::from_millis(800));
        }
        Ok(Response::text(200, req.path().to_string()))
    });

    let (slow_conn, mut slow_peer) = Connection::channel(4);
    let (fast_conn, mut fast_peer) = Connection::channel(4);
    tokio::spawn(app.call(slow_conn));
    tokio::spawn(app.call(fast_conn));

    request(&slow_peer, head("/slow", ""), &[]).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    request(&fast_peer, head("/fast", ""), &[]).await;
    let (_, _, body) = response(&mut fast_peer).await;
    assert_eq!(body, b"/fast");
    assert!(started.elapsed() < Duration::from_millis(600));

    let (_, _, body) = response(&mut slow_peer).await;
    assert_eq!(body, b"/slow");
}

#[tokio::test]
async fn lazy_response_streams_through_call() {
    let app = SyncAdapter::new(|_req: Request| -> anyhow::Result<Response> {
        Ok(Response::lazy(200, HeaderMap::new(), vec!["foo", "bar\n", "baz\n"]))
    });

    let (conn, mut peer) = Connection::channel(4);
    let call = tokio::spawn(app.call(conn));
    request(&peer, head("/", ""), &[]).await;

    let (status, headers, body) = response(&mut peer).await;
    assert_eq!(status, 200);
    assert_eq!(headers.get("transfer-encoding"), Some("chunked"));
    assert!(!headers.contains("content-length"));
    assert_eq!(body, b"foobar\nbaz\n");
    call.await.unwrap().unwrap();
}

#[tokio::test]
async fn disconnect_before_body_complete_skips_the_handler() {
    let app = SyncAdapter::new(|_req: Request| -> anyhow::Result<Response> {
        panic!("handler must not run for an incomplete request")
    });

    let (conn, mut peer) = Connection::channel(4);
    let call = tokio::spawn(app.call(conn));
    peer.send(InboundEvent::Connect(head("/", ""))).await.unwrap();
    peer.send(InboundEvent::Body(Bytes::from_static(b"half")))
        .await
        .unwrap();
    peer.send(InboundEvent::Disconnect).await.unwrap();

    assert!(call.await.unwrap().is_err());
    assert!(peer.receive().await.is_none());
}
