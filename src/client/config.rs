//! Client configuration

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};

use crate::protocol::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MOUNTPOINT, DEFAULT_PORT, DEFAULT_USER_AGENT,
};
use crate::protocol::ClientRequest;

/// Client configuration options
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address, `host:port`
    pub server_addr: String,

    /// Mountpoint to request
    pub mountpoint: String,

    /// Username (Basic auth is only sent when username and password are set)
    pub username: String,

    /// Password
    pub password: String,

    /// `User-Agent` header value
    pub user_agent: String,

    /// Relay read buffer size
    pub read_buffer_size: usize,

    /// Output file for received data
    pub output: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: format!("localhost:{}", DEFAULT_PORT),
            mountpoint: DEFAULT_MOUNTPOINT.to_string(),
            username: String::new(),
            password: String::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            read_buffer_size: DEFAULT_CHUNK_SIZE,
            output: PathBuf::from("rtcm_data.bin"),
        }
    }
}

impl ClientConfig {
    /// Create a config for a server address
    pub fn new(server_addr: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
            ..Default::default()
        }
    }

    /// Set the mountpoint
    pub fn mountpoint(mut self, mountpoint: impl Into<String>) -> Self {
        self.mountpoint = mountpoint.into();
        self
    }

    /// Set the credentials
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the read buffer size
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Set the output file
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = path.into();
        self
    }

    /// Build the handshake request
    pub fn request(&self) -> ClientRequest {
        ClientRequest::new(
            self.mountpoint.clone(),
            &self.username,
            &self.password,
            self.user_agent.clone(),
        )
    }

    /// Output path with the current local time appended, e.g.
    /// `rtcm_data.bin_20240131_235959`
    pub fn timestamped_output(&self) -> PathBuf {
        timestamped_path(&self.output, Local::now().naive_local())
    }
}

/// Append `_YYYYMMDD_HHMMSS` to a path
pub fn timestamped_path(path: &Path, at: NaiveDateTime) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!("_{}", at.format("%Y%m%d_%H%M%S")));
    PathBuf::from(name)
}
