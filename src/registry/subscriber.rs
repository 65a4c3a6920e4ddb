//! Subscriber entry
//!
//! A subscriber is the write side of one accepted connection. The registry
//! and the broadcast round share it through an `Arc`; the connection task
//! that owns the read side watches [`Subscriber::closed`] to know when to
//! stop.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Unique subscriber identity within one registry
pub type SubscriberId = u64;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One registered output connection
pub struct Subscriber {
    id: SubscriberId,
    peer_addr: SocketAddr,
    registered_at: Instant,
    writer: Mutex<BoxedWriter>,
    cancel: CancellationToken,
}

impl Subscriber {
    /// Create a subscriber around the write side of a connection.
    ///
    /// `cancel` is fired by [`Subscriber::close`]; pass a child of the
    /// server's shutdown token so shutdown closes every subscriber too.
    pub fn new<W>(id: SubscriberId, peer_addr: SocketAddr, writer: W, cancel: CancellationToken) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            id,
            peer_addr,
            registered_at: Instant::now(),
            writer: Mutex::new(Box::new(writer)),
            cancel,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// When the subscriber was created (right after its greeting)
    pub fn registered_at(&self) -> Instant {
        self.registered_at
    }

    /// Write one chunk, bounded by `timeout`.
    ///
    /// A timeout is reported as `io::ErrorKind::TimedOut`.
    pub async fn write_chunk(&self, chunk: &[u8], timeout: Duration) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "subscriber closed",
            ));
        }

        let write = async {
            let mut writer = self.writer.lock().await;
            writer.write_all(chunk).await?;
            writer.flush().await
        };

        match tokio::time::timeout(timeout, write).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "subscriber write timed out",
            )),
        }
    }

    /// Close the subscriber: signal its connection task and shut down the
    /// write side. Safe to call more than once.
    pub async fn close(&self) {
        self.cancel.cancel();

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            tracing::debug!(subscriber_id = self.id, error = %e, "Subscriber shutdown error");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the subscriber has been closed
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}
