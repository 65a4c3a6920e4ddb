//! Per-connection handler
//!
//! Reads the request head, answers with the greeting, registers the write
//! side as a subscriber, then reads the socket only to notice when the peer
//! goes away.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, HandshakeError, Result};
use crate::protocol::constants::{
    GREETING, RESPONSE_BAD_REQUEST, RESPONSE_NOT_FOUND, RESPONSE_UNAUTHORIZED,
};
use crate::protocol::{RequestHead, ServerHandshake};
use crate::registry::{Subscriber, SubscriberId, SubscriberRegistry};
use crate::server::config::ServerConfig;
use crate::stats::RelayStats;

pub(crate) struct Connection {
    id: SubscriberId,
    socket: TcpStream,
    peer_addr: SocketAddr,
    accepted_at: Instant,
    config: ServerConfig,
    registry: Arc<SubscriberRegistry>,
    stats: Arc<RelayStats>,
    shutdown: CancellationToken,
}

impl Connection {
    pub(crate) fn new(
        id: SubscriberId,
        socket: TcpStream,
        peer_addr: SocketAddr,
        config: ServerConfig,
        registry: Arc<SubscriberRegistry>,
        stats: Arc<RelayStats>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id,
            socket,
            peer_addr,
            accepted_at: Instant::now(),
            config,
            registry,
            stats,
            shutdown,
        }
    }

    /// Drive the connection until it is rejected, disconnects, or the
    /// server shuts down.
    pub(crate) async fn run(mut self) -> Result<()> {
        let shutdown = self.shutdown.clone();
        let handshake_timeout = self.config.handshake_timeout;

        let head = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(()),
            head = tokio::time::timeout(handshake_timeout, self.read_request()) => {
                head.map_err(Error::from).and_then(|r| r)
            }
        };

        let head = match head.and_then(|head| self.authorize(head)) {
            Ok(head) => head,
            Err(e) => {
                self.reject(&e).await;
                return Err(e);
            }
        };

        tracing::debug!(
            subscriber_id = self.id,
            mountpoint = %head.mountpoint,
            user_agent = head.user_agent().unwrap_or("-"),
            "Request received"
        );

        let greeting = tokio::time::timeout(self.config.write_timeout, async {
            self.socket.write_all(GREETING).await?;
            self.socket.flush().await
        })
        .await;
        match greeting {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(elapsed) => return Err(elapsed.into()),
        }

        let peer_addr = self.peer_addr;
        let (reader, writer) = self.socket.into_split();
        let subscriber = Arc::new(Subscriber::new(
            self.id,
            peer_addr,
            writer,
            self.shutdown.child_token(),
        ));

        self.registry.add(Arc::clone(&subscriber)).await;
        self.stats.record_accepted();

        let result = watch_disconnect(reader, &subscriber).await;

        self.registry.remove(self.id).await;
        subscriber.close().await;

        tracing::info!(
            subscriber_id = self.id,
            peer = %peer_addr,
            mountpoint = %head.mountpoint,
            connected_secs = self.accepted_at.elapsed().as_secs(),
            relayed_secs = subscriber.registered_at().elapsed().as_secs(),
            "Subscriber disconnected"
        );

        result
    }

    async fn read_request(&mut self) -> Result<RequestHead> {
        let mut handshake = ServerHandshake::with_limit(self.config.max_request_size);
        let mut buf = [0u8; 512];

        loop {
            let n = self.socket.read(&mut buf).await?;
            if n == 0 {
                return Err(HandshakeError::ConnectionClosed.into());
            }
            if let Some(head) = handshake.process(&buf[..n])? {
                return Ok(head);
            }
        }
    }

    fn authorize(&self, head: RequestHead) -> Result<RequestHead> {
        let credentials = self
            .config
            .credentials
            .as_ref()
            .map(|(user, pass)| (user.as_str(), pass.as_str()));

        head.authorize(self.config.mountpoint.as_deref(), credentials)?;
        Ok(head)
    }

    /// Best-effort error response before the socket is dropped
    async fn reject(&mut self, error: &Error) {
        tracing::warn!(
            subscriber_id = self.id,
            peer = %self.peer_addr,
            error = %error,
            "Handshake rejected"
        );

        if let Some(response) = rejection_response(error) {
            let timeout = self.config.write_timeout;
            if let Err(e) = write_rejection(&mut self.socket, response, timeout).await {
                tracing::debug!(
                    subscriber_id = self.id,
                    error = %e,
                    "Failed to send rejection response"
                );
            }
        }
    }
}

fn rejection_response(error: &Error) -> Option<&'static [u8]> {
    match error {
        Error::Handshake(HandshakeError::MalformedRequest(_))
        | Error::Handshake(HandshakeError::RequestTooLarge) => Some(RESPONSE_BAD_REQUEST),
        Error::Handshake(HandshakeError::MountpointMismatch(_)) => Some(RESPONSE_NOT_FOUND),
        Error::Handshake(HandshakeError::Unauthorized) => Some(RESPONSE_UNAUTHORIZED),
        _ => None,
    }
}

async fn write_rejection<W>(writer: &mut W, response: &[u8], timeout: Duration) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    tokio::time::timeout(timeout, writer.write_all(response)).await??;
    Ok(())
}

/// Read and discard until EOF, a read error, or the subscriber is closed
async fn watch_disconnect<R>(mut reader: R, subscriber: &Subscriber) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 64];

    loop {
        tokio::select! {
            _ = subscriber.closed() => return Ok(()),
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    tracing::debug!(subscriber_id = subscriber.id(), "Peer closed connection");
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => return Err(e.into()),
            },
        }
    }
}
