//! IPROTO wire boundary.
//!
//! This module contains the small slice of the Tarantool binary protocol the
//! connection layer needs in order to talk to a server: the connection
//! greeting, length-prefixed frames, request encoding and response header
//! decoding. Anything beyond that (schema, typed tuples, space/index helpers)
//! lives outside of this crate.
//!
//! # Binary Format
//!
//! - On connect the server sends a fixed 128 byte [`Greeting`].
//! - Every message afterwards is a frame: a MessagePack unsigned integer with
//!   the length of the rest of the frame, a header map and a body map.
//! - The header carries the request type (or response code) and the `sync`
//!   correlation id, which is how responses are matched to requests.
//!
//! # Key Components
//!
//! - [`Request`]: Trait implemented by every request shape sent to the server.
//! - [`Frame`]: A decoded header/body pair, see [`transport`].
//! - [`ResponseHeader`] and [`DataResponse`]: Decoded response pieces.
//!
//! # See Also
//!
//! - [`connection`](crate::connection): Multiplexes frames over one socket.
pub mod consts;
mod greeting;
mod request;
mod response;
#[cfg(test)]
pub(crate) mod server;
pub mod transport;

pub use greeting::{GREETING_SIZE, Greeting};
pub use request::{CallRequest, EvalRequest, PingRequest, RawRequest, Request, RequestType};
pub use response::{DataResponse, ResponseHeader};
pub use transport::Frame;
