//! Upstream stream sources
//!
//! The broadcaster only needs `read(buf) -> io::Result<usize>`. Anything that
//! implements [`AsyncRead`] qualifies: an upstream [`tokio::net::TcpStream`],
//! a [`DeviceSource`] opened on a serial device node, or an in-memory duplex
//! pipe in tests. Dropping the source closes the underlying handle.

use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

/// A single readable byte stream feeding the relay
pub trait StreamSource: Send + 'static {
    /// Read up to `buf.len()` bytes. `Ok(0)` means end of stream.
    fn read<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> impl Future<Output = io::Result<usize>> + Send + 'a;
}

impl<R> StreamSource for R
where
    R: AsyncRead + Unpin + Send + 'static,
{
    fn read<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> impl Future<Output = io::Result<usize>> + Send + 'a {
        AsyncReadExt::read(self, buf)
    }
}

/// Source backed by a device node or file.
///
/// Line settings (baud rate, parity) are expected to be configured on the
/// device before it is opened here.
#[derive(Debug)]
pub struct DeviceSource {
    file: File,
}

impl DeviceSource {
    /// Open a device for reading
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).await?;

        tracing::info!(device = %path.display(), "Stream source opened");

        Ok(Self { file })
    }
}

impl AsyncRead for DeviceSource {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_read(cx, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn drain<S: StreamSource>(source: &mut S) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 4];
        loop {
            let n = source.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    #[tokio::test]
    async fn test_duplex_as_source() {
        let (mut tx, mut rx) = tokio::io::duplex(64);
        tx.write_all(b"RTCM").await.unwrap();
        tx.write_all(b"DATA").await.unwrap();
        drop(tx);

        assert_eq!(drain(&mut rx).await, b"RTCMDATA");
    }

    #[tokio::test]
    async fn test_device_source_reads_file() {
        let path = std::env::temp_dir().join(format!("ntrip-source-{}.bin", std::process::id()));
        tokio::fs::write(&path, b"\xd3\x00\x13abc").await.unwrap();

        let mut source = DeviceSource::open(&path).await.unwrap();
        assert_eq!(drain(&mut source).await, b"\xd3\x00\x13abc");

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_device_source_missing() {
        let result = DeviceSource::open("/nonexistent/ntrip/device").await;
        assert!(result.is_err());
    }
}
