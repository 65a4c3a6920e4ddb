//! Statistics for relay sessions

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Client session statistics
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// Total relay bytes received
    pub bytes_received: u64,
    /// Number of chunks written to the sink
    pub chunks: u64,
    /// When relaying started
    pub started_at: Instant,
}

impl SessionStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self {
            bytes_received: 0,
            chunks: 0,
            started_at: Instant::now(),
        }
    }

    /// Record one received chunk
    pub fn record_chunk(&mut self, len: usize) {
        self.bytes_received += len as u64;
        self.chunks += 1;
    }

    /// Time since relaying started
    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Average bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration().as_secs();
        if secs > 0 {
            (self.bytes_received * 8) / secs
        } else {
            0
        }
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Live server counters, shared between the broadcast and accept tasks
#[derive(Debug)]
pub struct RelayStats {
    chunks: AtomicU64,
    bytes_read: AtomicU64,
    deliveries: AtomicU64,
    subscribers_accepted: AtomicU64,
    subscribers_dropped: AtomicU64,
    started_at: Instant,
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            chunks: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            subscribers_accepted: AtomicU64::new(0),
            subscribers_dropped: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Record a chunk read from the source and how many subscribers got it
    pub fn record_round(&self, len: usize, delivered: usize) {
        self.chunks.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(len as u64, Ordering::Relaxed);
        self.deliveries.fetch_add(delivered as u64, Ordering::Relaxed);
    }

    pub fn record_accepted(&self) {
        self.subscribers_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, count: usize) {
        self.subscribers_dropped
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot
    pub fn snapshot(&self, active_subscribers: usize) -> ServerStats {
        ServerStats {
            chunks: self.chunks.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            subscribers_accepted: self.subscribers_accepted.load(Ordering::Relaxed),
            subscribers_dropped: self.subscribers_dropped.load(Ordering::Relaxed),
            active_subscribers: active_subscribers as u64,
            uptime: self.started_at.elapsed(),
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Server-wide statistics snapshot
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    /// Chunks read from the source
    pub chunks: u64,
    /// Bytes read from the source
    pub bytes_read: u64,
    /// Successful chunk writes across all subscribers
    pub deliveries: u64,
    /// Subscribers that completed the handshake
    pub subscribers_accepted: u64,
    /// Subscribers removed after a failed write
    pub subscribers_dropped: u64,
    /// Subscribers registered at snapshot time
    pub active_subscribers: u64,
    /// Uptime
    pub uptime: Duration,
}
