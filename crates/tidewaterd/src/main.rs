//! tidewaterd: runs a synchronous demo handler behind the Tidewater server.
//!
//! # Usage
//!
//! ```text
//! tidewaterd serve --bind 127.0.0.1:8080
//! tidewaterd serve --config tidewater.toml
//! ```
//!
//! Every path echoes the request as JSON, except `/stream`, which answers
//! with a chunked body produced one line at a time.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tidewater_adapter::SyncAdapter;
use tidewater_core::{HeaderMap, Request, Response, TidewaterConfig};
use tidewater_server::Server;
use tracing::info;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "tidewaterd", about = "Tidewater demo server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the demo handler until Ctrl-C.
    Serve {
        /// TOML configuration file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Address to listen on. Overrides the config file.
        #[arg(long)]
        bind: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tidewater=debug")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config, bind } => serve(config, bind),
    }
}

fn serve(config_path: Option<PathBuf>, bind: Option<String>) -> anyhow::Result<()> {
    let file = match &config_path {
        Some(path) => TidewaterConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => TidewaterConfig::default(),
    };
    let mut server_config = file.server_config()?;
    if let Some(bind) = bind {
        server_config = server_config.with_bind(bind);
    }
    let adapter_config = file.adapter_config()?;

    let server = Server::new(
        SyncAdapter::with_config(demo, adapter_config)?,
        server_config,
    );
    server.start()?;

    if !server.wait_is_up(STARTUP_TIMEOUT) {
        server.join();
        return match server.final_error() {
            Some(e) => Err(anyhow::anyhow!("server failed to start: {e}")),
            None => Err(anyhow::anyhow!("server did not come up within {STARTUP_TIMEOUT:?}")),
        };
    }
    info!(url = %server.url().unwrap_or_default(), "tidewaterd ready");

    let signals = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    signals.block_on(tokio::signal::ctrl_c())?;

    info!("received Ctrl-C, shutting down");
    server.shutdown();
    server.join();
    info!("tidewaterd stopped");
    Ok(())
}

/// The built-in handler.
fn demo(req: Request) -> anyhow::Result<Response> {
    if req.path() == "/stream" {
        let lines: usize = req
            .query()
            .get("lines")
            .and_then(|n| n.parse().ok())
            .unwrap_or(5);
        let chunks = (0..lines).map(|i| {
            std::thread::sleep(Duration::from_millis(100));
            format!("line {i}\n")
        });
        return Ok(Response::lazy(200, HeaderMap::new(), chunks)
            .with_header("content-type", "text/plain; charset=utf-8"));
    }

    let headers: Vec<_> = req
        .headers()
        .iter()
        .map(|h| serde_json::json!([h.name, h.value]))
        .collect();
    let echo = serde_json::json!({
        "method": req.method(),
        "root_path": req.root_path(),
        "path": req.path(),
        "query": req.query().to_map(),
        "headers": headers,
        "body": req.text(),
    });

    let mut headers = HeaderMap::new();
    headers.insert("content-type", "application/json");
    Ok(Response::new(200, headers, serde_json::to_vec_pretty(&echo)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidewater_core::Body;

    #[test]
    fn echo_reports_the_request() {
        let req = Request::new("POST", "/hello?name=world", HeaderMap::new(), "ping");
        let resp = demo(req).unwrap();
        assert_eq!(resp.headers().get("content-type"), Some("application/json"));

        let Body::Full(bytes) = resp.body() else {
            panic!("expected a fixed body");
        };
        let echo: serde_json::Value = serde_json::from_slice(bytes).unwrap();
        assert_eq!(echo["method"], "POST");
        assert_eq!(echo["path"], "/hello");
        assert_eq!(echo["query"]["name"], "world");
        assert_eq!(echo["body"], "ping");
    }

    #[test]
    fn stream_is_lazy() {
        let req = Request::new("GET", "/stream?lines=2", HeaderMap::new(), "");
        let resp = demo(req).unwrap();
        assert!(resp.is_lazy());
    }

    #[test]
    fn cli_parses_serve() {
        let cli = Cli::try_parse_from(["tidewaterd", "serve", "--bind", "0.0.0.0:9000"]).unwrap();
        let Command::Serve { config, bind } = cli.command;
        assert!(config.is_none());
        assert_eq!(bind.as_deref(), Some("0.0.0.0:9000"));
    }
}
