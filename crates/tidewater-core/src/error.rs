//! Error types shared by the Tidewater crates.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the protocol event stream and configuration loading.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The other side of the event stream went away.
    #[error("peer disconnected")]
    Disconnected,

    #[error("failed to read config: {0}")]
    ConfigRead(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid config value for `{key}`: {value}")]
    ConfigValue { key: &'static str, value: String },
}
