//! NTRIP stream puller
//!
//! High-level client: connect to a caster, request a mountpoint and copy
//! the correction stream into a sink.

use std::future::Future;

use tokio::net::TcpStream;

use crate::error::Result;
use crate::stats::SessionStats;

use super::config::ClientConfig;
use super::session::RelaySession;
use super::sink::Sink;

/// NTRIP client
///
/// There is no reconnect logic: a dropped connection ends the session and
/// restarting is up to the caller.
///
/// # Example
/// ```no_run
/// use ntrip_relay::{ClientConfig, NtripClient, RelaySink};
///
/// # async fn example() -> ntrip_relay::Result<()> {
/// let config = ClientConfig::new("caster.example.com:2101")
///     .mountpoint("RTCM3")
///     .credentials("alice", "secret");
/// let client = NtripClient::new(config);
///
/// let session = client.connect().await?;
/// let mut sink = RelaySink::create(client.config().timestamped_output()).await?;
/// let stats = session.relay_into(&mut sink, std::future::pending()).await?;
/// println!("received {} bytes", stats.bytes_received);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct NtripClient {
    config: ClientConfig,
}

impl NtripClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connect and complete the handshake
    pub async fn connect(&self) -> Result<RelaySession<TcpStream>> {
        tracing::info!(
            server = %self.config.server_addr,
            mountpoint = %self.config.mountpoint,
            "Connecting to NTRIP server"
        );

        let stream = TcpStream::connect(&self.config.server_addr).await?;
        RelaySession::handshake(stream, self.config.request(), self.config.read_buffer_size).await
    }

    /// Connect and relay into `sink` until the server closes the stream
    pub async fn run<K: Sink>(&self, sink: &mut K) -> Result<SessionStats> {
        self.run_until(sink, std::future::pending()).await
    }

    /// Connect and relay into `sink` until the server closes the stream or
    /// `shutdown` resolves
    pub async fn run_until<K, F>(&self, sink: &mut K, shutdown: F) -> Result<SessionStats>
    where
        K: Sink,
        F: Future<Output = ()>,
    {
        let session = self.connect().await?;
        session.relay_into(sink, shutdown).await
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;
    use crate::client::sink::RelaySink;
    use crate::error::{Error, HandshakeError};

    /// One-shot fake caster: captures the request head, sends `response`
    async fn fake_caster(response: &'static [u8]) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 256];
            while !head.ends_with(b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response).await.unwrap();
            String::from_utf8(head).unwrap()
        });

        (addr, handle)
    }

    #[tokio::test]
    async fn test_run_receives_stream() {
        let (addr, caster) = fake_caster(b"ICY 200 OK\r\nRTCM").await;
        let client = NtripClient::new(ClientConfig::new(addr).mountpoint("MP1"));

        let mut sink = RelaySink::new(Vec::new());
        let stats = client.run(&mut sink).await.unwrap();

        assert_eq!(sink.get_ref(), b"RTCM");
        assert_eq!(stats.bytes_received, 4);

        let head = caster.await.unwrap();
        assert!(head.starts_with("GET /MP1 HTTP/1.0\r\n"));
        assert!(!head.contains("Authorization"));
    }

    #[tokio::test]
    async fn test_credentials_sent_as_basic_auth() {
        let (addr, caster) = fake_caster(b"ICY 200 OK\r\n").await;
        let client = NtripClient::new(ClientConfig::new(addr).credentials("alice", "secret"));

        let mut sink = RelaySink::new(Vec::new());
        client.run(&mut sink).await.unwrap();

        let head = caster.await.unwrap();
        assert!(head.contains("Authorization: Basic YWxpY2U6c2VjcmV0\r\n"));
    }

    #[tokio::test]
    async fn test_rejected_response() {
        let (addr, _caster) = fake_caster(b"HTTP/1.1 401 Unauthorized\r\n\r\n").await;
        let client = NtripClient::new(ClientConfig::new(addr));

        let mut sink = RelaySink::new(Vec::new());
        let result = client.run(&mut sink).await;

        assert!(matches!(
            result,
            Err(Error::Handshake(HandshakeError::InvalidGreeting(_)))
        ));
        assert!(sink.get_ref().is_empty());
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Bind then drop to get a port with nothing listening
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = NtripClient::new(ClientConfig::new(addr));
        assert!(matches!(client.connect().await, Err(Error::Io(_))));
    }
}
