//! Error types shared by every layer of the client.
use std::io;

use thiserror::Error;

use crate::connection::RequestId;

/// Failures while turning values into frames or frames into values.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode message: {0}")]
    Encode(String),
    #[error("failed to decode message: {0}")]
    Decode(String),
    #[error("failed to convert value: {0}")]
    Value(String),
    #[error("malformed frame: {0}")]
    Frame(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("not connected")]
    NotConnected,

    #[error("connection is disposed")]
    Disposed,

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("connection lost while waiting for a response")]
    ConnectionLost,

    #[error("server error {code:#x}: {message}")]
    Protocol { code: u32, message: String },

    #[error("request {0} timed out")]
    Timeout(RequestId),

    #[error("unexpected greeting: {0}")]
    Greeting(String),

    #[error("invalid connection string '{input}', {reason}")]
    InvalidAddress { input: String, reason: String },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl Error {
    /// Whether the failure belongs to the physical connection rather than to
    /// the request itself. The next call will reconnect after such errors.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::NotConnected | Error::Transport(_) | Error::ConnectionLost
        )
    }
}
