//! Client-side sinks
//!
//! A [`Sink`] receives every relayed chunk with the boundaries it was read
//! with. [`RelaySink`] writes chunks to an output (usually a file) and
//! mirrors them on a broadcast channel for live observers such as a status
//! display. The mirror never applies backpressure: an observer that falls
//! behind loses chunks, the output does not.

use std::future::Future;
use std::io;
use std::path::Path;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;

/// Default number of chunks buffered for each mirror observer
pub const DEFAULT_MIRROR_CAPACITY: usize = 256;

/// Destination for relayed chunks
pub trait Sink: Send {
    /// Store one chunk
    fn write_chunk(&mut self, chunk: Bytes) -> impl Future<Output = io::Result<()>> + Send;

    /// Flush anything buffered; called when the session ends cleanly
    fn flush(&mut self) -> impl Future<Output = io::Result<()>> + Send;
}

/// Output writer plus a live mirror
pub struct RelaySink<W> {
    output: W,
    mirror: broadcast::Sender<Bytes>,
    bytes_written: u64,
}

impl RelaySink<File> {
    /// Create (truncate) an output file
    pub async fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path.as_ref()).await?;
        tracing::info!(output = %path.as_ref().display(), "Output file created");
        Ok(Self::new(file))
    }
}

impl<W> RelaySink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(output: W) -> Self {
        Self::with_mirror_capacity(output, DEFAULT_MIRROR_CAPACITY)
    }

    pub fn with_mirror_capacity(output: W, capacity: usize) -> Self {
        let (mirror, _) = broadcast::channel(capacity.max(1));
        Self {
            output,
            mirror,
            bytes_written: 0,
        }
    }

    /// Observe every chunk written from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.mirror.subscribe()
    }

    /// Bytes written to the output so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn get_ref(&self) -> &W {
        &self.output
    }

    pub fn into_inner(self) -> W {
        self.output
    }
}

impl<W> Sink for RelaySink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_chunk(&mut self, chunk: Bytes) -> io::Result<()> {
        self.output.write_all(&chunk).await?;
        self.output.flush().await?;
        self.bytes_written += chunk.len() as u64;

        // No observers is fine
        let _ = self.mirror.send(chunk);
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.output.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    #[tokio::test]
    async fn test_write_and_mirror() {
        let mut sink = RelaySink::new(Vec::new());
        let mut observer = sink.subscribe();

        sink.write_chunk(Bytes::from_static(b"AB")).await.unwrap();
        sink.write_chunk(Bytes::from_static(b"CD")).await.unwrap();

        assert_eq!(observer.recv().await.unwrap(), Bytes::from_static(b"AB"));
        assert_eq!(observer.recv().await.unwrap(), Bytes::from_static(b"CD"));
        assert_eq!(sink.bytes_written(), 4);
        assert_eq!(sink.get_ref(), b"ABCD");
    }

    #[tokio::test]
    async fn test_write_without_observers() {
        let mut sink = RelaySink::new(Vec::new());
        sink.write_chunk(Bytes::from_static(b"x")).await.unwrap();
        assert_eq!(sink.into_inner(), b"x");
    }

    #[tokio::test]
    async fn test_slow_observer_does_not_block_output() {
        let mut sink = RelaySink::with_mirror_capacity(Vec::new(), 1);
        let mut observer = sink.subscribe();

        for chunk in [&b"1"[..], b"2", b"3"] {
            sink.write_chunk(Bytes::copy_from_slice(chunk)).await.unwrap();
        }

        assert_eq!(sink.get_ref(), b"123");
        assert!(matches!(observer.recv().await, Err(RecvError::Lagged(_))));
    }

    #[tokio::test]
    async fn test_observer_drains_after_sink_dropped() {
        let mut sink = RelaySink::new(Vec::new());
        let mut observer = sink.subscribe();

        sink.write_chunk(Bytes::from_static(b"last")).await.unwrap();
        drop(sink);

        assert_eq!(observer.recv().await.unwrap(), Bytes::from_static(b"last"));
        assert!(matches!(observer.recv().await, Err(RecvError::Closed)));
    }

    #[tokio::test]
    async fn test_file_sink() {
        let path = std::env::temp_dir().join(format!("ntrip-sink-{}.bin", std::process::id()));

        let mut sink = RelaySink::create(&path).await.unwrap();
        sink.write_chunk(Bytes::from_static(b"\xd3\x00")).await.unwrap();
        sink.flush().await.unwrap();
        drop(sink);

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"\xd3\x00");
        let _ = tokio::fs::remove_file(&path).await;
    }
}
