//! tidewater-server: HTTP/1.1 server with a synchronous control surface.
//!
//! [`Server`] owns a dedicated thread running a single-threaded tokio
//! runtime. Each request reaching the hyper connection is converted to a
//! protocol event stream and handed to an [`Application`]; the outbound
//! events are turned back into an HTTP response, with [`OutboundBody`]
//! aborting the connection when the stream ends without `End`.
//!
//! [`Application`]: tidewater_core::Application

mod body;
mod connection;
pub mod convert;
mod error;
mod server;
mod state;

pub use body::OutboundBody;
pub use error::{BodyError, ServerError, ServerResult};
pub use server::Server;
pub use state::ServerState;
