//! Error types
//!
//! Session-scoped failures (source, handshake, bind) surface as [`Error`].
//! Per-subscriber failures never do: they are logged and the subscriber is
//! dropped from the registry.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Crate error type
#[derive(Debug, Error)]
pub enum Error {
    /// Generic socket or file I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Listener could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The upstream stream source failed; the relay cannot continue
    #[error("stream source read failed: {0}")]
    Source(#[source] io::Error),

    /// Handshake failed on either side
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// Writing to the local sink failed
    #[error("sink write failed: {0}")]
    Sink(#[source] io::Error),

    /// An operation did not complete within its deadline
    #[error("operation timed out")]
    Timeout,
}

/// Handshake failures
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// Response did not start with the `ICY` marker
    #[error("invalid server response: {0:?}")]
    InvalidGreeting(String),

    /// Peer closed the connection before the handshake completed
    #[error("connection closed during handshake")]
    ConnectionClosed,

    /// Request head exceeded the configured limit
    #[error("request head too large")]
    RequestTooLarge,

    /// Request line could not be parsed
    #[error("malformed request: {0:?}")]
    MalformedRequest(String),

    /// Requested mountpoint does not match the served one
    #[error("unknown mountpoint: {0}")]
    MountpointMismatch(String),

    /// Missing or wrong credentials
    #[error("unauthorized")]
    Unauthorized,
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Timeout
    }
}
