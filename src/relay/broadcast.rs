//! Broadcast loop
//!
//! Reads the source one chunk at a time and writes each chunk to every
//! subscriber in the registry. A round finishes for all subscribers before
//! the next chunk is read, so each subscriber sees the source bytes in
//! source order. Writes inside a round run concurrently and each is bounded
//! by the write timeout; a subscriber that fails is closed and removed
//! without affecting the rest of the round.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::registry::SubscriberRegistry;
use crate::source::StreamSource;
use crate::stats::RelayStats;

/// Result of a single broadcast round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundOutcome {
    /// Subscribers that accepted the chunk
    pub delivered: usize,
    /// Subscribers removed because their write failed
    pub dropped: usize,
}

/// Drives a stream source into a subscriber registry
pub struct Broadcaster<S> {
    source: S,
    fanout: Fanout,
    chunk_size: usize,
}

/// Everything a round needs except the source
struct Fanout {
    registry: Arc<SubscriberRegistry>,
    stats: Arc<RelayStats>,
    write_timeout: Duration,
}

impl<S: StreamSource> Broadcaster<S> {
    /// Create a broadcaster that owns `source` for its whole lifetime
    pub fn new(
        source: S,
        registry: Arc<SubscriberRegistry>,
        chunk_size: usize,
        write_timeout: Duration,
    ) -> Self {
        Self {
            source,
            fanout: Fanout {
                registry,
                stats: Arc::new(RelayStats::new()),
                write_timeout,
            },
            chunk_size: chunk_size.max(1),
        }
    }

    /// Share a stats collector with the caller
    pub fn with_stats(mut self, stats: Arc<RelayStats>) -> Self {
        self.fanout.stats = stats;
        self
    }

    /// Run until the source ends, fails, or `shutdown` fires.
    ///
    /// A source read error is returned as [`Error::Source`]; end of stream
    /// and shutdown return `Ok`. The source is dropped (closed) on return.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        let mut buf = vec![0u8; self.chunk_size];

        loop {
            let read = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::debug!("Broadcast loop stopped by shutdown");
                    return Ok(());
                }
                read = self.source.read(&mut buf) => read,
            };

            match read {
                Ok(0) => {
                    tracing::info!("Stream source reached end of stream");
                    return Ok(());
                }
                Ok(n) => {
                    let chunk = Bytes::copy_from_slice(&buf[..n]);
                    self.fanout.broadcast(chunk).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Error reading from stream source");
                    return Err(Error::Source(e));
                }
            }
        }
    }

    /// Write one chunk to every registered subscriber
    pub async fn broadcast(&self, chunk: Bytes) -> RoundOutcome {
        self.fanout.broadcast(chunk).await
    }
}

impl Fanout {
    async fn broadcast(&self, chunk: Bytes) -> RoundOutcome {
        let timeout = self.write_timeout;
        let len = chunk.len();

        let results = self
            .registry
            .for_each(|subscriber| {
                let chunk = chunk.clone();
                async move {
                    let result = subscriber.write_chunk(&chunk, timeout).await;
                    (subscriber, result)
                }
            })
            .await;

        let mut outcome = RoundOutcome::default();
        for (subscriber, result) in results {
            match result {
                Ok(()) => outcome.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        subscriber_id = subscriber.id(),
                        peer = %subscriber.peer_addr(),
                        error = %e,
                        "Error writing to subscriber, dropping it"
                    );
                    if self.registry.remove(subscriber.id()).await.is_some() {
                        outcome.dropped += 1;
                    }
                    subscriber.close().await;
                }
            }
        }

        self.stats.record_round(len, outcome.delivered);
        self.stats.record_dropped(outcome.dropped);

        tracing::debug!(
            bytes = len,
            delivered = outcome.delivered,
            dropped = outcome.dropped,
            "Chunk broadcast"
        );

        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};

    use super::*;
    use crate::registry::Subscriber;

    /// Writer that rejects every write
    struct BrokenWriter;

    impl AsyncWrite for BrokenWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Source that fails on first read
    struct FailingSource;

    impl AsyncRead for FailingSource {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "device unplugged")))
        }
    }

    fn addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000)
    }

    async fn add_duplex(registry: &SubscriberRegistry) -> (Arc<Subscriber>, DuplexStream) {
        let (writer, reader) = tokio::io::duplex(4096);
        let sub = Arc::new(Subscriber::new(
            registry.next_id(),
            addr(),
            writer,
            CancellationToken::new(),
        ));
        registry.add(Arc::clone(&sub)).await;
        (sub, reader)
    }

    fn broadcaster<S: StreamSource>(source: S, registry: &Arc<SubscriberRegistry>) -> Broadcaster<S> {
        Broadcaster::new(source, Arc::clone(registry), 1024, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_source_bytes_reach_all_subscribers_in_order() {
        let registry = Arc::new(SubscriberRegistry::new());
        let (_a, mut ra) = add_duplex(&registry).await;
        let (_b, mut rb) = add_duplex(&registry).await;

        let (mut feed, source) = tokio::io::duplex(64);
        let task = tokio::spawn(broadcaster(source, &registry).run(CancellationToken::new()));

        feed.write_all(b"AB").await.unwrap();
        feed.write_all(b"CD").await.unwrap();
        drop(feed);

        task.await.unwrap().unwrap();

        let mut buf = [0u8; 4];
        ra.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ABCD");
        rb.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ABCD");
    }

    #[tokio::test]
    async fn test_failed_subscriber_does_not_block_others() {
        let registry = Arc::new(SubscriberRegistry::new());
        let broken = Arc::new(Subscriber::new(
            registry.next_id(),
            addr(),
            BrokenWriter,
            CancellationToken::new(),
        ));
        registry.add(Arc::clone(&broken)).await;
        let (_good, mut reader) = add_duplex(&registry).await;

        let (_feed, source) = tokio::io::duplex(8);
        let engine = broadcaster(source, &registry);

        let outcome = engine.broadcast(Bytes::from_static(b"RTCM")).await;
        assert_eq!(outcome, RoundOutcome { delivered: 1, dropped: 1 });

        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"RTCM");

        assert!(!registry.contains(broken.id()).await);
        assert!(broken.is_closed());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_broadcast_with_no_subscribers() {
        let registry = Arc::new(SubscriberRegistry::new());
        let (_feed, source) = tokio::io::duplex(8);
        let engine = broadcaster(source, &registry);

        let outcome = engine.broadcast(Bytes::from_static(b"x")).await;
        assert_eq!(outcome, RoundOutcome::default());
    }

    #[tokio::test]
    async fn test_source_error_is_fatal() {
        let registry = Arc::new(SubscriberRegistry::new());
        let result = broadcaster(FailingSource, &registry)
            .run(CancellationToken::new())
            .await;

        assert!(matches!(result, Err(Error::Source(_))));
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop_and_drops_source() {
        let registry = Arc::new(SubscriberRegistry::new());
        let (mut feed, source) = tokio::io::duplex(8);
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(broadcaster(source, &registry).run(shutdown.clone()));
        shutdown.cancel();
        task.await.unwrap().unwrap();

        // Source end was dropped with the broadcaster
        assert!(feed.write_all(b"late").await.is_err());
    }

    #[tokio::test]
    async fn test_stats_recorded() {
        let registry = Arc::new(SubscriberRegistry::new());
        let (_a, _ra) = add_duplex(&registry).await;
        let stats = Arc::new(RelayStats::new());

        let (_feed, source) = tokio::io::duplex(8);
        let engine = broadcaster(source, &registry).with_stats(Arc::clone(&stats));
        engine.broadcast(Bytes::from_static(b"abc")).await;

        let snapshot = stats.snapshot(registry.len().await);
        assert_eq!(snapshot.chunks, 1);
        assert_eq!(snapshot.bytes_read, 3);
        assert_eq!(snapshot.deliveries, 1);
    }
}
