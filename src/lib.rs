//! NTRIP correction stream relay
//!
//! Fans a single upstream byte stream (a serial device or an upstream socket)
//! out to any number of NTRIP subscribers, and provides the matching client
//! that pulls a mountpoint into a local sink.
//!
//! ```text
//!  StreamSource ──► Broadcaster ──► SubscriberRegistry ──► N sockets
//!
//!  NtripClient ──► handshake ──► RelaySink (file + mirror)
//! ```
//!
//! # Example
//! ```no_run
//! use ntrip_relay::{NtripServer, ServerConfig};
//!
//! # async fn example() -> ntrip_relay::Result<()> {
//! let source = tokio::net::TcpStream::connect("192.168.1.20:5000").await?;
//! let server = NtripServer::start(ServerConfig::default(), source).await?;
//!
//! server
//!     .run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! # }
//! ```

pub mod client;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod server;
pub mod session;
pub mod source;
pub mod stats;

pub use client::{ClientConfig, NtripClient, RelaySink, Sink};
pub use error::{Error, HandshakeError, Result};
pub use registry::{Subscriber, SubscriberId, SubscriberRegistry};
pub use server::{NtripServer, ServerConfig};
pub use source::{DeviceSource, StreamSource};
