//! The synchronous control surface over the async event loop.

use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use tidewater_core::{Application, ServerConfig};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::connection::{Dispatch, serve_request};
use crate::convert::ConnInfo;
use crate::error::{ServerError, ServerResult};
use crate::state::{ServerState, StateCell};

/// How often `wait_is_up` re-checks the state.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long to wait for blocking workers once the loop has stopped.
/// A handler still running after this is detached.
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Pause after a failed `accept` (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// State shared between the controlling thread and the loop thread.
#[derive(Debug)]
struct Shared {
    state: StateCell,
    final_error: OnceLock<ServerError>,
    bound: OnceLock<SocketAddr>,
    /// Set once the loop thread is done, whatever the outcome.
    exited: AtomicBool,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: StateCell::new(),
            final_error: OnceLock::new(),
            bound: OnceLock::new(),
            exited: AtomicBool::new(false),
        }
    }

    /// Bind confirmation from the loop thread. The only way into `Up`.
    ///
    /// Returns `false` when a shutdown was requested while binding.
    fn on_bound(&self, addr: SocketAddr) -> bool {
        let _ = self.bound.set(addr);
        self.state.transition(ServerState::Starting, ServerState::Up)
    }

    fn fail(&self, err: ServerError) {
        error!(error = %err, "server failed");
        let _ = self.final_error.set(err);
    }

    /// Settle to `Down` from wherever the loop thread stopped.
    fn finish(&self) {
        self.state.transition(ServerState::Up, ServerState::Stopping);
        if !self.state.transition(ServerState::Stopping, ServerState::Down) {
            self.state.transition(ServerState::Starting, ServerState::Down);
        }
        self.exited.store(true, Ordering::Release);
    }

    /// Whether startup can no longer reach `Up`.
    fn gave_up(&self) -> bool {
        self.exited.load(Ordering::Acquire) || self.final_error.get().is_some()
    }
}

/// An HTTP server running on its own thread.
///
/// `start` spawns a thread that runs a single-threaded tokio runtime.
/// Every request is handed to the [`Application`] as a protocol event
/// stream, and blocking work inside the application runs on that
/// runtime's blocking pool, bounded by
/// [`ServerConfig::worker_threads`].
///
/// Errors on the loop thread are recorded, never propagated: a failed
/// bind shows up as [`final_error`](Self::final_error) and makes
/// [`wait_is_up`](Self::wait_is_up) return `false`.
///
/// ```no_run
/// # use std::time::Duration;
/// # use tidewater_core::ServerConfig;
/// # fn demo(app: impl tidewater_core::Application) {
/// let server = tidewater_server::Server::new(app, ServerConfig::default());
/// server.start().unwrap();
/// assert!(server.wait_is_up(Duration::from_secs(5)));
/// println!("listening on {}", server.url().unwrap());
/// server.shutdown();
/// server.join();
/// # }
/// ```
pub struct Server {
    app: Arc<dyn Application>,
    config: ServerConfig,
    shared: Arc<Shared>,
    launched: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Server {
    pub fn new(app: impl Application, config: ServerConfig) -> Self {
        Self::from_arc(Arc::new(app), config)
    }

    pub fn from_arc(app: Arc<dyn Application>, config: ServerConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            app,
            config,
            shared: Arc::new(Shared::new()),
            launched: AtomicBool::new(false),
            shutdown_tx,
            thread: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Spawn the event loop thread and return immediately.
    ///
    /// A server runs at most once; calling `start` again fails with
    /// [`ServerError::AlreadyStarted`]. An invalid [`ServerConfig`] fails
    /// with [`ServerError::Config`] and leaves the server down.
    pub fn start(&self) -> ServerResult<()> {
        self.config.validate()?;
        if self.launched.swap(true, Ordering::AcqRel)
            || !self
                .shared
                .state
                .transition(ServerState::Down, ServerState::Starting)
        {
            return Err(ServerError::AlreadyStarted);
        }

        let app = self.app.clone();
        let config = self.config.clone();
        let shared = self.shared.clone();
        let shutdown = self.shutdown_tx.subscribe();

        let spawned = thread::Builder::new()
            .name("tidewater-server".to_string())
            .spawn(move || run(app, config, shared, shutdown));

        match spawned {
            Ok(handle) => {
                *self.thread.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.finish();
                Err(ServerError::Spawn(e))
            }
        }
    }

    /// Block until the server is up or `timeout` elapses.
    ///
    /// May be called before `start`, from another thread; a server that
    /// has not been started yet is waited for. Returns `false` without
    /// waiting out the timeout once startup can no longer succeed (bind
    /// failed, shutdown requested, loop thread gone).
    pub fn wait_is_up(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            match self.state() {
                ServerState::Up => return true,
                ServerState::Stopping => return false,
                ServerState::Starting | ServerState::Down if self.shared.gave_up() => {
                    return false;
                }
                ServerState::Starting | ServerState::Down => {}
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    pub fn is_up(&self) -> bool {
        self.state() == ServerState::Up
    }

    pub fn state(&self) -> ServerState {
        self.shared.state.load()
    }

    /// Ask the event loop to stop.
    ///
    /// New connections are refused at once. Requests in flight, including
    /// streaming responses, get [`ServerConfig::shutdown_grace`] to finish
    /// before their connections are closed. Does not wait; use
    /// [`join`](Self::join) for that. Calling it again is a no-op.
    pub fn shutdown(&self) {
        loop {
            let from = self.state();
            if !matches!(from, ServerState::Starting | ServerState::Up) {
                return;
            }
            if self.shared.state.transition(from, ServerState::Stopping) {
                break;
            }
        }
        info!("shutdown requested");
        self.shutdown_tx.send_replace(true);
    }

    /// Wait for the event loop thread to exit.
    pub fn join(&self) {
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("server thread panicked");
            }
        }
    }

    /// The address the listener bound, once it has.
    pub fn bound_addr(&self) -> Option<SocketAddr> {
        self.shared.bound.get().copied()
    }

    /// `http://host:port` of the bound listener.
    pub fn url(&self) -> Option<String> {
        self.bound_addr().map(|addr| format!("http://{addr}"))
    }

    /// Why the server stopped, if it failed.
    pub fn final_error(&self) -> Option<&ServerError> {
        self.shared.final_error.get()
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("bound", &self.bound_addr())
            .finish_non_exhaustive()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
        self.join();
    }
}

/// Body of the loop thread. Always leaves the state `Down`, with the
/// final error set if the loop could not run to completion.
fn run(
    app: Arc<dyn Application>,
    config: ServerConfig,
    shared: Arc<Shared>,
    shutdown: watch::Receiver<bool>,
) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        run_loop(app, &config, &shared, shutdown);
    }));
    if let Err(payload) = outcome {
        shared.fail(ServerError::Panicked(panic_message(payload.as_ref())));
    }

    shared.finish();
    info!("server stopped");
}

fn run_loop(
    app: Arc<dyn Application>,
    config: &ServerConfig,
    shared: &Shared,
    shutdown: watch::Receiver<bool>,
) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .max_blocking_threads(config.worker_threads)
        .thread_name("tidewater-worker")
        .build();

    match runtime {
        Ok(runtime) => {
            runtime.block_on(serve(app, config, shared, shutdown));
            runtime.shutdown_timeout(WORKER_JOIN_TIMEOUT);
        }
        Err(e) => shared.fail(ServerError::Runtime(e)),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn serve(
    app: Arc<dyn Application>,
    config: &ServerConfig,
    shared: &Shared,
    mut shutdown: watch::Receiver<bool>,
) {
    let bound = match TcpListener::bind(&config.bind).await {
        Ok(listener) => listener.local_addr().map(|addr| (listener, addr)),
        Err(e) => Err(e),
    };
    let (listener, local) = match bound {
        Ok(bound) => bound,
        Err(source) => {
            shared.fail(ServerError::Bind {
                addr: config.bind.clone(),
                source,
            });
            return;
        }
    };

    if !shared.on_bound(local) {
        debug!(addr = %local, "shutdown requested during startup");
        return;
    }
    info!(addr = %local, "server listening");

    let dispatch = Arc::new(Dispatch {
        app,
        event_buffer: config.event_buffer,
        root_path: config.root_path.clone(),
    });
    let graceful = GracefulShutdown::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, client)) => {
                    let info = ConnInfo { client, server: local };
                    let dispatch = dispatch.clone();
                    let svc = service_fn(move |req| serve_request(dispatch.clone(), info, req));
                    let conn = graceful.watch(
                        http1::Builder::new().serve_connection(TokioIo::new(stream), svc),
                    );
                    tokio::spawn(async move {
                        if let Err(e) = conn.await {
                            debug!(%client, error = %e, "connection closed with error");
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            _ = shutdown.wait_for(|stop| *stop) => break,
        }
    }

    drop(listener);
    info!(grace = ?config.shutdown_grace, "draining connections");
    tokio::select! {
        _ = graceful.shutdown() => debug!("all connections drained"),
        _ = tokio::time::sleep(config.shutdown_grace) => {
            warn!(grace = ?config.shutdown_grace, "grace period elapsed; closing remaining connections");
        }
    }
}
