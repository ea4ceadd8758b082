//! tidewater-core: request/response model and protocol events.
//!
//! Defines the two sides Tidewater bridges:
//!
//! - the synchronous model handlers are written against
//!   ([`Request`], [`Response`], [`Body`]), and
//! - the asynchronous event stream the server speaks
//!   ([`InboundEvent`], [`OutboundEvent`], [`Application`]).
//!
//! Configuration parsing for the server and adapter lives in [`config`].

pub mod body;
pub mod config;
mod error;
mod header;
pub mod protocol;
mod query;
mod request;
mod response;

pub use body::{Body, Chunks, LazyBody, DEFAULT_CHUNK_SIZE};
pub use config::{AdapterConfig, ServerConfig, TidewaterConfig};
pub use error::{CoreError, CoreResult};
pub use header::{Header, HeaderMap};
pub use protocol::{
    Application, BoxFuture, Connection, ConnectionPeer, InboundEvent, OutboundEvent, RequestHead,
};
pub use query::{QueryParams, decode_path};
pub use request::Request;
pub use response::Response;
