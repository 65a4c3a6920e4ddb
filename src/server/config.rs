//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::protocol::constants::*;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent subscribers (0 = unlimited)
    pub max_connections: usize,

    /// Size of each chunk read from the stream source
    pub read_buffer_size: usize,

    /// Upper bound for one subscriber write; slower subscribers are dropped
    pub write_timeout: Duration,

    /// Request head must arrive within this time
    pub handshake_timeout: Duration,

    /// Largest accepted request head
    pub max_request_size: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Served mountpoint. `None` accepts any mountpoint.
    pub mountpoint: Option<String>,

    /// Required Basic credentials. `None` accepts anyone.
    pub credentials: Option<(String, String)>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 0, // Unlimited
            read_buffer_size: DEFAULT_CHUNK_SIZE,
            write_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(10),
            max_request_size: MAX_REQUEST_SIZE,
            tcp_nodelay: true, // Corrections are latency sensitive
            mountpoint: None,
            credentials: None,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the source read chunk size
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Set the per-subscriber write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Only admit requests for this mountpoint
    pub fn mountpoint(mut self, mountpoint: impl Into<String>) -> Self {
        self.mountpoint = Some(mountpoint.into());
        self
    }

    /// Require Basic credentials
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.read_buffer_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.max_request_size, MAX_REQUEST_SIZE);
        assert!(config.tcp_nodelay);
        assert!(config.mountpoint.is_none());
        assert!(config.credentials.is_none());
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:2102".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 2102);
    }

    #[test]
    fn test_builder_read_buffer_size_not_zero() {
        let config = ServerConfig::default().read_buffer_size(0);

        assert_eq!(config.read_buffer_size, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:2101".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .max_connections(50)
            .read_buffer_size(4096)
            .write_timeout(Duration::from_secs(2))
            .handshake_timeout(Duration::from_secs(3))
            .mountpoint("RTCM3")
            .credentials("alice", "secret");

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.read_buffer_size, 4096);
        assert_eq!(config.write_timeout, Duration::from_secs(2));
        assert_eq!(config.handshake_timeout, Duration::from_secs(3));
        assert_eq!(config.mountpoint.as_deref(), Some("RTCM3"));
        assert_eq!(
            config.credentials,
            Some(("alice".to_string(), "secret".to_string()))
        );
    }
}
