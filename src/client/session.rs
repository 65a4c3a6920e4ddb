//! Client relay session
//!
//! Runs the handshake over any transport and then copies the stream into a
//! [`Sink`]. Generic over the transport so it can be driven by a
//! `TcpStream` or by an in-memory mock.

use std::future::Future;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::client::sink::Sink;
use crate::error::{Error, HandshakeError, Result};
use crate::protocol::constants::MAX_GREETING_SIZE;
use crate::protocol::{ClientHandshake, ClientRequest};
use crate::session::{SessionPhase, SessionState};
use crate::stats::SessionStats;

/// A connection that completed the handshake
#[derive(Debug)]
pub struct RelaySession<T> {
    io: T,
    state: SessionState,
    /// Relay bytes that arrived together with the greeting
    pending: Bytes,
    chunk_size: usize,
}

impl<T> RelaySession<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Send the request and wait for the greeting.
    ///
    /// On failure the transport is dropped, which closes the connection.
    pub async fn handshake(mut io: T, request: ClientRequest, chunk_size: usize) -> Result<Self> {
        let mut state = SessionState::new();
        let mountpoint = request.mountpoint.clone();

        match exchange(&mut io, request, &mut state).await {
            Ok(pending) => {
                state.start_relaying();
                tracing::info!(mountpoint = %mountpoint, "Connected to NTRIP server, receiving data");

                Ok(Self {
                    io,
                    state,
                    pending,
                    chunk_size: chunk_size.max(1),
                })
            }
            Err(e) => {
                state.fail();
                tracing::warn!(mountpoint = %mountpoint, error = %e, "NTRIP handshake failed");
                Err(e)
            }
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    /// Copy the stream into `sink` until the server closes the connection
    /// (clean end) or `shutdown` resolves.
    pub async fn relay_into<K, F>(mut self, sink: &mut K, shutdown: F) -> Result<SessionStats>
    where
        K: Sink,
        F: Future<Output = ()>,
    {
        let mut stats = SessionStats::new();
        let result = self.copy(sink, shutdown, &mut stats).await;

        match &result {
            Ok(()) => {
                self.state.finish();
                tracing::info!(
                    bytes = stats.bytes_received,
                    chunks = stats.chunks,
                    duration_secs = stats.duration().as_secs(),
                    "Relay session finished"
                );
            }
            Err(e) => {
                self.state.fail();
                tracing::error!(error = %e, bytes = stats.bytes_received, "Relay session failed");
            }
        }

        result.map(|()| stats)
    }

    async fn copy<K, F>(&mut self, sink: &mut K, shutdown: F, stats: &mut SessionStats) -> Result<()>
    where
        K: Sink,
        F: Future<Output = ()>,
    {
        let mut shutdown = std::pin::pin!(shutdown);

        let pending = std::mem::take(&mut self.pending);
        if !pending.is_empty() {
            let len = pending.len();
            sink.write_chunk(pending).await.map_err(Error::Sink)?;
            stats.record_chunk(len);
        }

        let mut buf = vec![0u8; self.chunk_size];
        loop {
            let n = tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Relay session stopped by shutdown");
                    break;
                }
                read = self.io.read(&mut buf) => read?,
            };

            if n == 0 {
                tracing::info!("Connection closed by server");
                break;
            }

            sink.write_chunk(Bytes::copy_from_slice(&buf[..n]))
                .await
                .map_err(Error::Sink)?;
            stats.record_chunk(n);

            tracing::debug!(bytes = n, "Received correction data");
        }

        sink.flush().await.map_err(Error::Sink)
    }
}

async fn exchange<T>(io: &mut T, request: ClientRequest, state: &mut SessionState) -> Result<Bytes>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut handshake = ClientHandshake::new(request);

    if let Some(request) = handshake.generate_request() {
        io.write_all(&request).await?;
        io.flush().await?;
    }
    state.request_sent();
    state.await_greeting();

    let mut buf = [0u8; MAX_GREETING_SIZE];
    loop {
        let n = io.read(&mut buf).await?;
        if n == 0 {
            return Err(HandshakeError::ConnectionClosed.into());
        }
        if let Some(rest) = handshake.process(&buf[..n])? {
            return Ok(rest);
        }
    }
}
