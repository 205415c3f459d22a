//! Connection lifecycle and request multiplexing.
//!
//! Many callers share one socket. Each request is tagged with a unique
//! correlation id ([`RequestId`]) and registered in a pending table before it
//! is written; a reader thread matches responses back to their callers in
//! whatever order they arrive.
//!
//! # Key Components
//!
//! - [`LogicalConnectionManager`]: Caller-facing connection, reconnects on demand.
//! - [`PhysicalConnection`]: One socket with its reader thread and serialized writer.
//! - [`PingScheduler`]: Decides when an idle connection needs a keep-alive ping.
//! - [`RequestIdCounter`]: Source of correlation ids.
//!
//! # See Also
//!
//! - [`protocol`](crate::protocol): Frames and request shapes sent over the socket.
mod manager;
mod pending;
mod physical;
mod ping;
mod request_id;

pub use manager::{ConnectionState, LogicalConnectionManager};
pub use physical::PhysicalConnection;
pub use ping::PingScheduler;
pub use request_id::{RequestId, RequestIdCounter};
