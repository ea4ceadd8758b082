//! tidewater.toml configuration.
//!
//! The file format uses optional fields and human-readable durations
//! (`"5s"`, `"500ms"`, `"2m"`). [`TidewaterConfig::server_config`] and
//! [`TidewaterConfig::adapter_config`] resolve it into runtime settings
//! with defaults filled in.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::body::DEFAULT_CHUNK_SIZE;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TidewaterConfig {
    pub server: Option<ServerSection>,
    pub adapter: Option<AdapterSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSection {
    pub bind: Option<String>,
    pub shutdown_grace: Option<String>,
    pub worker_threads: Option<usize>,
    pub event_buffer: Option<usize>,
    pub root_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdapterSection {
    pub chunk_size: Option<usize>,
    pub max_body_bytes: Option<usize>,
}

impl TidewaterConfig {
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> CoreResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Resolve the `[server]` section.
    pub fn server_config(&self) -> CoreResult<ServerConfig> {
        let mut config = ServerConfig::default();
        let Some(section) = &self.server else {
            return Ok(config);
        };

        if let Some(bind) = &section.bind {
            config.bind = bind.clone();
        }
        if let Some(grace) = &section.shutdown_grace {
            config.shutdown_grace =
                parse_duration(grace).ok_or_else(|| CoreError::ConfigValue {
                    key: "server.shutdown_grace",
                    value: grace.clone(),
                })?;
        }
        if let Some(workers) = section.worker_threads {
            config.worker_threads = workers;
        }
        if let Some(buffer) = section.event_buffer {
            config.event_buffer = buffer;
        }
        if let Some(root_path) = &section.root_path {
            config.root_path = root_path.trim_end_matches('/').to_string();
        }
        config.validate()?;
        Ok(config)
    }

    /// Resolve the `[adapter]` section.
    pub fn adapter_config(&self) -> CoreResult<AdapterConfig> {
        let mut config = AdapterConfig::default();
        let Some(section) = &self.adapter else {
            return Ok(config);
        };

        if let Some(chunk_size) = section.chunk_size {
            config.chunk_size = chunk_size;
        }
        config.max_body_bytes = section.max_body_bytes;
        config.validate()?;
        Ok(config)
    }
}

/// Reject a zero where a positive count is required.
fn non_zero(key: &'static str, value: usize) -> CoreResult<()> {
    if value == 0 {
        return Err(CoreError::ConfigValue {
            key,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Runtime settings for the server lifecycle wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind, e.g. `127.0.0.1:8080` or `localhost:0`.
    pub bind: String,
    /// How long in-flight responses may run after shutdown is requested.
    pub shutdown_grace: Duration,
    /// Upper bound on worker threads running blocking handler code.
    pub worker_threads: usize,
    /// Buffered protocol events per direction, per request.
    pub event_buffer: usize,
    /// Mount prefix reported to the application, without a trailing `/`.
    pub root_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:0".to_string(),
            shutdown_grace: Duration::from_secs(5),
            worker_threads: 64,
            event_buffer: 16,
            root_path: String::new(),
        }
    }
}

impl ServerConfig {
    /// Builder method: set the bind address.
    pub fn with_bind(self, bind: impl Into<String>) -> Self {
        Self {
            bind: bind.into(),
            ..self
        }
    }

    /// Builder method: set the shutdown grace period.
    pub fn with_shutdown_grace(self, shutdown_grace: Duration) -> Self {
        Self {
            shutdown_grace,
            ..self
        }
    }

    /// Builder method: set the worker pool bound.
    pub fn with_worker_threads(self, worker_threads: usize) -> Self {
        Self {
            worker_threads,
            ..self
        }
    }

    /// Builder method: set the per-request event buffer.
    pub fn with_event_buffer(self, event_buffer: usize) -> Self {
        Self {
            event_buffer,
            ..self
        }
    }

    /// Builder method: set the mount prefix.
    pub fn with_root_path(self, root_path: impl Into<String>) -> Self {
        let root_path: String = root_path.into();
        Self {
            root_path: root_path.trim_end_matches('/').to_string(),
            ..self
        }
    }

    /// Check the values the builders and public fields cannot enforce.
    pub fn validate(&self) -> CoreResult<()> {
        non_zero("server.worker_threads", self.worker_threads)?;
        non_zero("server.event_buffer", self.event_buffer)
    }
}

/// Runtime settings for the synchronous handler adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    /// Frame size used when emitting fixed bodies.
    pub chunk_size: usize,
    /// Reject request bodies larger than this with 413.
    pub max_body_bytes: Option<usize>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_body_bytes: None,
        }
    }
}

impl AdapterConfig {
    /// Builder method: set the fixed-body frame size.
    pub fn with_chunk_size(self, chunk_size: usize) -> Self {
        Self { chunk_size, ..self }
    }

    /// Builder method: limit the request body size.
    pub fn with_max_body_bytes(self, max_body_bytes: usize) -> Self {
        Self {
            max_body_bytes: Some(max_body_bytes),
            ..self
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        non_zero("adapter.chunk_size", self.chunk_size)
    }
}

/// Parse `"5s"`, `"500ms"`, `"2m"`, or a bare number of seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
