//! tidewater-adapter: runs blocking handlers behind an async server.
//!
//! [`SyncAdapter`] implements the protocol-event [`Application`] interface
//! on top of a synchronous [`Handler`].
//!
//! # Architecture
//!
//! ```text
//! InboundEvent stream
//!   │
//!   ├── Connect(head) + Body* + BodyComplete → Request
//!   ├── spawn_blocking(handler.handle(request)) → Response
//!   ├── fixed body → Start(content-length) → Body* → End
//!   └── lazy body  → Start(chunked) → [pull on worker → Body]* → End
//!   │
//!   ▼
//! OutboundEvent stream
//! ```
//!
//! Handler errors become a bare 500. A lazy body whose producer fails
//! is truncated (no `End`), and a lazy body whose client went away is
//! dropped at the next chunk boundary.
//!
//! [`Application`]: tidewater_core::Application

mod adapter;
mod error;
mod handler;
pub mod phase;
mod pump;

pub use adapter::SyncAdapter;
pub use error::{AdapterError, AdapterResult};
pub use handler::Handler;
pub use phase::RequestPhase;
