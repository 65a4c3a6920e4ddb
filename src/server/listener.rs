//! NTRIP server listener
//!
//! Owns the three long-lived pieces of a running relay: the broadcast task
//! (which owns the stream source), the accept task (which owns the TCP
//! listener), and the per-connection tasks. All of them hang off one
//! cancellation token, so any shutdown path releases the source, the
//! listening socket and every subscriber. Dropping the server handle
//! without calling [`NtripServer::stop`] cancels that token too.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tokio_util::task::TaskTracker;

use crate::error::{Error, Result};
use crate::registry::SubscriberRegistry;
use crate::relay::Broadcaster;
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::source::StreamSource;
use crate::stats::{RelayStats, ServerStats};

/// A running NTRIP relay server
pub struct NtripServer {
    local_addr: SocketAddr,
    registry: Arc<SubscriberRegistry>,
    stats: Arc<RelayStats>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    broadcast_task: JoinHandle<Result<()>>,
    accept_task: JoinHandle<()>,
    _cancel_on_drop: DropGuard,
}

impl NtripServer {
    /// Bind the listener and start relaying `source`.
    ///
    /// Returns [`Error::Bind`] if the address cannot be bound; nothing is
    /// spawned in that case.
    pub async fn start<S: StreamSource>(config: ServerConfig, source: S) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| Error::Bind {
                addr: config.bind_addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "NTRIP server listening");

        let registry = Arc::new(SubscriberRegistry::new());
        let stats = Arc::new(RelayStats::new());
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();

        let broadcaster = Broadcaster::new(
            source,
            Arc::clone(&registry),
            config.read_buffer_size,
            config.write_timeout,
        )
        .with_stats(Arc::clone(&stats));

        let broadcast_task = {
            let shutdown = shutdown.clone();
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                let result = broadcaster.run(shutdown.clone()).await;

                // No source, nothing to relay: take the whole server down
                shutdown.cancel();
                registry.close_all().await;
                result
            })
        };

        let acceptor = Acceptor {
            connection_semaphore: (config.max_connections > 0)
                .then(|| Arc::new(Semaphore::new(config.max_connections))),
            config,
            registry: Arc::clone(&registry),
            stats: Arc::clone(&stats),
            shutdown: shutdown.clone(),
            tracker: tracker.clone(),
        };
        let accept_task = tokio::spawn(acceptor.run(listener));

        Ok(Self {
            local_addr,
            registry,
            stats,
            _cancel_on_drop: shutdown.clone().drop_guard(),
            shutdown,
            tracker,
            broadcast_task,
            accept_task,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get a reference to the subscriber registry
    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Current server statistics
    pub async fn stats(&self) -> ServerStats {
        self.stats.snapshot(self.registry.len().await)
    }

    /// Run until `signal` resolves or the relay stops on its own, then stop.
    ///
    /// Returns the source error if the relay stopped because its source failed.
    pub async fn run_until<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let stopped = self.shutdown.clone();

        tokio::select! {
            _ = signal => tracing::info!("Shutdown signal received"),
            _ = stopped.cancelled() => tracing::warn!("Relay stopped"),
        }

        self.stop().await
    }

    /// Stop the server: close the source, the listener and every subscriber,
    /// and wait for all tasks to finish.
    pub async fn stop(self) -> Result<()> {
        tracing::info!(addr = %self.local_addr, "Shutting down NTRIP server");
        self.shutdown.cancel();

        if let Err(e) = self.accept_task.await {
            tracing::error!(error = %e, "Accept task failed");
        }

        let result = match self.broadcast_task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "Broadcast task failed");
                Ok(())
            }
        };

        self.registry.close_all().await;
        self.tracker.close();
        self.tracker.wait().await;

        let stats = self.stats.snapshot(0);
        tracing::info!(
            bytes_relayed = stats.bytes_read,
            subscribers_served = stats.subscribers_accepted,
            "NTRIP server stopped"
        );

        result
    }
}

struct Acceptor {
    config: ServerConfig,
    registry: Arc<SubscriberRegistry>,
    stats: Arc<RelayStats>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl Acceptor {
    async fn run(self, listener: TcpListener) {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((socket, peer_addr)) => self.handle_connection(socket, peer_addr),
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                    }
                },
            }
        }

        tracing::debug!("Accept loop stopped");
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let id = self.registry.next_id();
        tracing::debug!(subscriber_id = id, peer = %peer_addr, "New connection");

        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(error = %e, "Failed to configure socket");
            return;
        }

        let connection = Connection::new(
            id,
            socket,
            peer_addr,
            self.config.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.stats),
            self.shutdown.clone(),
        );

        self.tracker.spawn(async move {
            let _permit = permit;

            if let Err(e) = connection.run().await {
                tracing::debug!(subscriber_id = id, error = %e, "Connection error");
            }

            tracing::debug!(subscriber_id = id, "Connection closed");
        });
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }
}
