pub mod cli;
pub mod client;
pub mod connection;
mod error;
pub mod options;
pub mod protocol;

pub use client::Client;
pub use connection::{ConnectionState, LogicalConnectionManager, RequestId};
pub use error::{CodecError, Error};
pub use options::{ClientOptions, ConnectionOptions, Endpoint, LogSink};
pub use protocol::DataResponse;
pub use rmpv::Value;

pub type Result<T> = std::result::Result<T, Error>;
