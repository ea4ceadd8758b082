//! End-to-end requests through a running server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tidewater_adapter::SyncAdapter;
use tidewater_core::{AdapterConfig, HeaderMap, Request, Response, ServerConfig};
use tidewater_server::Server;
use tokio::net::TcpStream;

struct Reply {
    status: u16,
    headers: hyper::HeaderMap,
    body: Bytes,
}

/// Send one request on a fresh connection.
async fn send(addr: SocketAddr, req: hyper::Request<Full<Bytes>>) -> Reply {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut sender, conn) = http1::handshake(TokioIo::new(stream)).await.unwrap();
    tokio::spawn(conn);

    let resp = sender.send_request(req).await.unwrap();
    let status = resp.status().as_u16();
    let headers = resp.headers().clone();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    Reply {
        status,
        headers,
        body,
    }
}

fn get(path: &str) -> hyper::Request<Full<Bytes>> {
    hyper::Request::get(path)
        .header("host", "localhost")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

fn start<F>(handler: F) -> Server
where
    F: Fn(Request) -> anyhow::Result<Response> + Send + Sync + 'static,
{
    start_with(handler, AdapterConfig::default())
}

fn start_with<F>(handler: F, adapter: AdapterConfig) -> Server
where
    F: Fn(Request) -> anyhow::Result<Response> + Send + Sync + 'static,
{
    start_configured(
        handler,
        adapter,
        ServerConfig::default().with_shutdown_grace(Duration::from_secs(1)),
    )
}

fn start_configured<F>(handler: F, adapter: AdapterConfig, config: ServerConfig) -> Server
where
    F: Fn(Request) -> anyhow::Result<Response> + Send + Sync + 'static,
{
    let server = Server::new(SyncAdapter::with_config(handler, adapter).unwrap(), config);
    server.start().unwrap();
    assert!(server.wait_is_up(Duration::from_secs(5)));
    server
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Runtime::new().unwrap()
}

#[test]
fn custom_headers_and_query_reach_the_handler() {
    let server = start(|req: Request| {
        assert_eq!(req.headers().get("x-amz-target"), Some("testing"));
        Ok(Response::text(
            200,
            serde_json::to_string(&req.query().to_map())?,
        ))
    });
    let addr = server.bound_addr().unwrap();

    let reply = runtime().block_on(async {
        let req = hyper::Request::get("/foobar?foo=bar")
            .header("host", "localhost")
            .header("x-amz-target", "testing")
            .body(Full::new(Bytes::new()))
            .unwrap();
        send(addr, req).await
    });

    assert_eq!(reply.status, 200);
    let query: serde_json::Value = serde_json::from_slice(&reply.body).unwrap();
    assert_eq!(query, serde_json::json!({"foo": "bar"}));
}

#[test]
fn request_metadata_is_populated() {
    let server = start(|req: Request| {
        let line = format!(
            "{} {} {} {} {} {}",
            req.method(),
            req.path(),
            req.raw_path(),
            req.query_string(),
            req.http_version(),
            req.scheme(),
        );
        assert!(req.client_addr().is_some());
        assert!(req.server_addr().is_some());
        Ok(Response::text(200, line))
    });
    let addr = server.bound_addr().unwrap();

    let reply = runtime().block_on(send(addr, get("/a%20b?x=1")));
    assert_eq!(reply.body, "GET /a b /a%20b x=1 HTTP/1.1 http");
}

#[test]
fn raw_body_is_delivered_exactly() {
    let server = start(|req: Request| Ok(Response::new(200, HeaderMap::new(), req.body().clone())));
    let addr = server.bound_addr().unwrap();

    let reply = runtime().block_on(async {
        let req = hyper::Request::post("/echo")
            .header("host", "localhost")
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from(r#"{"foo": "bar"}"#)))
            .unwrap();
        send(addr, req).await
    });

    assert_eq!(reply.status, 200);
    assert_eq!(reply.body, r#"{"foo": "bar"}"#);
}

#[test]
fn fixed_body_declares_its_length() {
    let server = start(|_req: Request| Ok(Response::text(200, "x".repeat(200_000))));
    let addr = server.bound_addr().unwrap();

    let reply = runtime().block_on(send(addr, get("/")));
    assert_eq!(reply.headers["content-length"], "200000");
    assert!(reply.headers.get("transfer-encoding").is_none());
    assert_eq!(reply.body.len(), 200_000);
}

#[test]
fn lazy_body_is_chunked_and_ordered() {
    let server = start(|_req: Request| {
        Ok(Response::lazy(200, HeaderMap::new(), vec!["foo", "bar\n", "baz\n"]))
    });
    let addr = server.bound_addr().unwrap();

    let reply = runtime().block_on(send(addr, get("/stream")));
    assert_eq!(reply.status, 200);
    assert_eq!(reply.headers["transfer-encoding"], "chunked");
    assert!(reply.headers.get("content-length").is_none());

    let text = String::from_utf8(reply.body.to_vec()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines, vec!["foobar", "baz"]);
}

#[test]
fn empty_lazy_body_is_still_chunked() {
    let server = start(|_req: Request| {
        Ok(Response::lazy(200, HeaderMap::new(), Vec::<Bytes>::new()))
    });
    let addr = server.bound_addr().unwrap();

    let reply = runtime().block_on(send(addr, get("/")));
    assert_eq!(reply.headers["transfer-encoding"], "chunked");
    assert!(reply.body.is_empty());
}

#[test]
fn handler_error_is_a_bare_500() {
    let server = start(|_req: Request| -> anyhow::Result<Response> {
        anyhow::bail!("secret connection string")
    });
    let addr = server.bound_addr().unwrap();

    let reply = runtime().block_on(send(addr, get("/")));
    assert_eq!(reply.status, 500);
    assert_eq!(reply.body, "Internal Server Error");
}

#[test]
fn oversized_body_is_rejected() {
    let called = Arc::new(AtomicBool::new(false));
    let seen = called.clone();
    let server = start_with(
        move |_req: Request| {
            seen.store(true, Ordering::SeqCst);
            Ok(Response::empty(200))
        },
        AdapterConfig::default().with_max_body_bytes(16),
    );
    let addr = server.bound_addr().unwrap();

    let reply = runtime().block_on(async {
        let req = hyper::Request::post("/")
            .header("host", "localhost")
            .body(Full::new(Bytes::from(vec![b'a'; 64])))
            .unwrap();
        send(addr, req).await
    });
    assert_eq!(reply.status, 413);
    assert!(!called.load(Ordering::SeqCst));
}

#[test]
fn concurrent_requests_are_isolated() {
    let server = start(|req: Request| {
        let name = req.query().get("name").unwrap_or_default().to_string();
        std::thread::sleep(Duration::from_millis(20));
        Ok(Response::text(200, format!("{name}:{}", req.text())))
    });
    let addr = server.bound_addr().unwrap();

    runtime().block_on(async {
        let mut tasks = Vec::new();
        for i in 0..8 {
            tasks.push(tokio::spawn(async move {
                let req = hyper::Request::post(format!("/?name=client{i}"))
                    .header("host", "localhost")
                    .body(Full::new(Bytes::from(format!("payload{i}"))))
                    .unwrap();
                (i, send(addr, req).await)
            }));
        }
        for task in tasks {
            let (i, reply) = task.await.unwrap();
            assert_eq!(reply.body, format!("client{i}:payload{i}"));
        }
    });
}

#[test]
fn slow_handler_does_not_block_others() {
    let server = start(|req: Request| {
        if req.path() == "/slow" {
            std::thread::sleep(Duration::from_millis(1500));
        }
        Ok(Response::text(200, req.path().to_string()))
    });
    let addr = server.bound_addr().unwrap();

    runtime().block_on(async {
        let slow = tokio::spawn(send(addr, get("/slow")));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        let fast = send(addr, get("/fast")).await;
        assert_eq!(fast.body, "/fast");
        assert!(started.elapsed() < Duration::from_millis(1000));

        assert_eq!(slow.await.unwrap().body, "/slow");
    });
}

#[test]
fn keep_alive_connection_serves_several_requests() {
    let server = start(|req: Request| Ok(Response::text(200, req.path().to_string())));
    let addr = server.bound_addr().unwrap();

    runtime().block_on(async {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (mut sender, conn) = http1::handshake(TokioIo::new(stream)).await.unwrap();
        tokio::spawn(conn);

        for path in ["/one", "/two", "/three"] {
            let resp = sender.send_request(get(path)).await.unwrap();
            let body = resp.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(body, path);
        }
    });
}

#[test]
fn failing_producer_truncates_the_response() {
    let server = start(|_req: Request| {
        let chunks: Vec<anyhow::Result<&'static str>> =
            vec![Ok("partial\n"), Err(anyhow::anyhow!("disk gone"))];
        Ok(Response::try_lazy(200, HeaderMap::new(), chunks))
    });
    let addr = server.bound_addr().unwrap();

    runtime().block_on(async {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (mut sender, conn) = http1::handshake(TokioIo::new(stream)).await.unwrap();
        tokio::spawn(conn);

        let resp = sender.send_request(get("/")).await.unwrap();
        assert_eq!(resp.status(), 200);
        assert!(resp.into_body().collect().await.is_err());
    });
}

#[test]
fn in_flight_stream_finishes_during_shutdown() {
    let server = start(|_req: Request| {
        let ticks = (0..5).map(|i| {
            std::thread::sleep(Duration::from_millis(50));
            format!("tick {i}\n")
        });
        Ok(Response::lazy(200, HeaderMap::new(), ticks))
    });
    let addr = server.bound_addr().unwrap();

    let rt = runtime();
    let pending = rt.spawn(send(addr, get("/ticks")));
    std::thread::sleep(Duration::from_millis(100));
    server.shutdown();

    let reply = rt.block_on(pending).unwrap();
    assert_eq!(reply.body.iter().filter(|&&b| b == b'\n').count(), 5);
    server.join();
}

#[test]
fn root_path_is_reported_to_the_handler() {
    let server = start_configured(
        |req: Request| Ok(Response::text(200, format!("{}|{}", req.root_path(), req.path()))),
        AdapterConfig::default(),
        ServerConfig::default().with_root_path("/api/"),
    );
    let addr = server.bound_addr().unwrap();

    let reply = runtime().block_on(send(addr, get("/users")));
    assert_eq!(reply.body, "/api|/users");
}

#[test]
fn non_ascii_response_header_round_trips() {
    let server = start(|_req: Request| {
        Ok(Response::text(200, "ok").with_header("x-city", "Z\u{fc}rich"))
    });
    let addr = server.bound_addr().unwrap();

    let reply = runtime().block_on(send(addr, get("/")));
    assert_eq!(reply.headers["x-city"].as_bytes(), b"Z\xfcrich");
}

struct Endless {
    released: Arc<AtomicBool>,
}

impl Iterator for Endless {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        std::thread::sleep(Duration::from_millis(20));
        Some(Bytes::from_static(b"tick\n"))
    }
}

impl Drop for Endless {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

#[test]
fn stream_outliving_the_grace_period_is_cut_off() {
    let grace = Duration::from_millis(300);
    let released = Arc::new(AtomicBool::new(false));
    let producer_flag = released.clone();
    let server = start_configured(
        move |_req: Request| {
            let body = Endless {
                released: producer_flag.clone(),
            };
            Ok(Response::lazy(200, HeaderMap::new(), body))
        },
        AdapterConfig::default(),
        ServerConfig::default().with_shutdown_grace(grace),
    );
    let addr = server.bound_addr().unwrap();

    let rt = runtime();
    let mut body = rt.block_on(async {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (mut sender, conn) = http1::handshake(TokioIo::new(stream)).await.unwrap();
        tokio::spawn(conn);

        let resp = sender.send_request(get("/forever")).await.unwrap();
        assert_eq!(resp.headers()["transfer-encoding"], "chunked");
        let mut body = resp.into_body();
        let first = body.frame().await.unwrap().unwrap();
        assert_eq!(first.into_data().unwrap(), "tick\n");
        body
    });

    server.shutdown();
    let started = Instant::now();
    server.join();
    let waited = started.elapsed();
    assert!(waited >= grace - Duration::from_millis(50));
    assert!(waited < grace + Duration::from_secs(2));

    // The client gets what was already sent, then a broken chunked body.
    let truncated = rt.block_on(async {
        loop {
            match body.frame().await {
                Some(Ok(_)) => continue,
                Some(Err(_)) => return true,
                None => return false,
            }
        }
    });
    assert!(truncated);

    let deadline = Instant::now() + Duration::from_secs(2);
    while !released.load(Ordering::SeqCst) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(released.load(Ordering::SeqCst));
}
