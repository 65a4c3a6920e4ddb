//! NTRIP handshake implementation
//!
//! Both sides are modelled as small state machines fed with whatever bytes
//! the socket produced, so partial reads never lose data:
//!
//! - [`ClientHandshake`] emits the request and then waits for a greeting
//!   starting with `ICY`. Any bytes that arrive after the greeting line are
//!   relay data and are handed back to the caller.
//! - [`ServerHandshake`] buffers the request head up to the blank line and
//!   parses it into a [`RequestHead`].

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{BufMut, Bytes, BytesMut};

use crate::error::HandshakeError;
use crate::protocol::constants::{
    CRLF, GREETING_MARKER, HEAD_TERMINATOR, MAX_GREETING_SIZE, MAX_REQUEST_SIZE,
};

/// Outbound request built by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRequest {
    /// Mountpoint name, without the leading slash
    pub mountpoint: String,
    /// Username and password for Basic authentication
    pub credentials: Option<(String, String)>,
    /// `User-Agent` header value
    pub user_agent: String,
}

impl ClientRequest {
    /// Create a request for a mountpoint.
    ///
    /// Credentials are only kept when both username and password are non-empty.
    pub fn new(
        mountpoint: impl Into<String>,
        username: &str,
        password: &str,
        user_agent: impl Into<String>,
    ) -> Self {
        let credentials = if !username.is_empty() && !password.is_empty() {
            Some((username.to_string(), password.to_string()))
        } else {
            None
        };

        Self {
            mountpoint: mountpoint.into(),
            credentials,
            user_agent: user_agent.into(),
        }
    }

    /// Encode the request head
    pub fn encode(&self) -> Bytes {
        let mountpoint = self.mountpoint.trim_start_matches('/');
        let mut buf = BytesMut::with_capacity(128);

        buf.put_slice(format!("GET /{} HTTP/1.0\r\n", mountpoint).as_bytes());
        if let Some((user, pass)) = &self.credentials {
            let token = STANDARD.encode(format!("{}:{}", user, pass));
            buf.put_slice(format!("Authorization: Basic {}\r\n", token).as_bytes());
        }
        buf.put_slice(format!("User-Agent: {}\r\n", self.user_agent).as_bytes());
        buf.put_slice(b"Connection: close\r\n");
        buf.put_slice(CRLF);

        buf.freeze()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientState {
    /// Request not yet generated
    Initial,
    /// Request sent, waiting for the greeting line
    AwaitingGreeting,
    /// Greeting accepted
    Done,
}

/// Client side of the handshake
#[derive(Debug)]
pub struct ClientHandshake {
    request: ClientRequest,
    state: ClientState,
    buffer: BytesMut,
}

impl ClientHandshake {
    /// Create a new client handshake
    pub fn new(request: ClientRequest) -> Self {
        Self {
            request,
            state: ClientState::Initial,
            buffer: BytesMut::new(),
        }
    }

    /// Generate the request bytes.
    ///
    /// Returns `None` if the request was already generated.
    pub fn generate_request(&mut self) -> Option<Bytes> {
        if self.state != ClientState::Initial {
            return None;
        }

        self.state = ClientState::AwaitingGreeting;
        Some(self.request.encode())
    }

    /// Feed response bytes.
    ///
    /// Returns `Ok(None)` while more bytes are needed, and `Ok(Some(rest))`
    /// once the greeting is accepted, where `rest` holds any relay bytes that
    /// followed the greeting line in the same read.
    pub fn process(&mut self, data: &[u8]) -> Result<Option<Bytes>, HandshakeError> {
        if self.state != ClientState::AwaitingGreeting {
            return Ok(None);
        }

        self.buffer.extend_from_slice(data);

        let marker_len = GREETING_MARKER.len();
        let checked = self.buffer.len().min(marker_len);
        if self.buffer[..checked] != GREETING_MARKER[..checked] {
            return Err(HandshakeError::InvalidGreeting(first_line(&self.buffer)));
        }
        if self.buffer.len() < marker_len {
            return Ok(None);
        }

        match find(&self.buffer, CRLF) {
            Some(pos) => {
                let mut buffer = std::mem::take(&mut self.buffer);
                let rest = buffer.split_off(pos + CRLF.len());
                self.state = ClientState::Done;
                Ok(Some(rest.freeze()))
            }
            None if self.buffer.len() >= MAX_GREETING_SIZE => {
                // Unterminated but well-prefixed greeting: accept it whole
                self.buffer.clear();
                self.state = ClientState::Done;
                Ok(Some(Bytes::new()))
            }
            None => Ok(None),
        }
    }
}

/// Parsed request head received by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    /// Request method (`GET` for subscribers)
    pub method: String,
    /// Requested mountpoint, without the leading slash
    pub mountpoint: String,
    /// Protocol version token, e.g. `HTTP/1.0`
    pub version: String,
    /// Header fields in arrival order
    pub headers: Vec<(String, String)>,
}

impl RequestHead {
    /// Parse a request head (without requiring the terminating blank line)
    pub fn parse(data: &[u8]) -> Result<Self, HandshakeError> {
        let text = String::from_utf8_lossy(data);
        let mut lines = text.split("\r\n");

        let request_line = lines.next().unwrap_or_default();
        let mut parts = request_line.split_whitespace();
        let (method, target, version) = match (parts.next(), parts.next(), parts.next()) {
            (Some(m), Some(t), Some(v)) if parts.next().is_none() => (m, t, v),
            _ => return Err(HandshakeError::MalformedRequest(request_line.to_string())),
        };

        if !target.starts_with('/') {
            return Err(HandshakeError::MalformedRequest(request_line.to_string()));
        }

        let headers = lines
            .take_while(|line| !line.is_empty())
            .filter_map(|line| {
                let (name, value) = line.split_once(':')?;
                Some((name.trim().to_string(), value.trim().to_string()))
            })
            .collect();

        Ok(Self {
            method: method.to_string(),
            mountpoint: target.trim_start_matches('/').to_string(),
            version: version.to_string(),
            headers,
        })
    }

    /// Look up a header value (case-insensitive name)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `User-Agent` header, if present
    pub fn user_agent(&self) -> Option<&str> {
        self.header("User-Agent")
    }

    /// Decode Basic credentials from the `Authorization` header
    pub fn basic_credentials(&self) -> Option<(String, String)> {
        let value = self.header("Authorization")?;
        let (scheme, token) = value.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("Basic") {
            return None;
        }

        let decoded = STANDARD.decode(token.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (user, pass) = decoded.split_once(':')?;
        Some((user.to_string(), pass.to_string()))
    }

    /// Check the request against an optional served mountpoint and
    /// optional required credentials. `None` means not enforced.
    pub fn authorize(
        &self,
        mountpoint: Option<&str>,
        credentials: Option<(&str, &str)>,
    ) -> Result<(), HandshakeError> {
        if let Some(expected) = mountpoint {
            if self.mountpoint != expected.trim_start_matches('/') {
                return Err(HandshakeError::MountpointMismatch(self.mountpoint.clone()));
            }
        }

        if let Some((user, pass)) = credentials {
            match self.basic_credentials() {
                Some((u, p)) if u == user && p == pass => {}
                _ => return Err(HandshakeError::Unauthorized),
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerState {
    /// Buffering the request head
    ReadingRequest,
    /// Request head parsed
    Done,
}

/// Server side of the handshake
#[derive(Debug)]
pub struct ServerHandshake {
    state: ServerState,
    buffer: BytesMut,
    max_request_size: usize,
}

impl ServerHandshake {
    /// Create a new server handshake with the default request size limit
    pub fn new() -> Self {
        Self::with_limit(MAX_REQUEST_SIZE)
    }

    /// Create a new server handshake with a custom request size limit
    pub fn with_limit(max_request_size: usize) -> Self {
        Self {
            state: ServerState::ReadingRequest,
            buffer: BytesMut::new(),
            max_request_size,
        }
    }

    /// Feed request bytes.
    ///
    /// Returns `Ok(Some(head))` once the blank line terminating the head has
    /// been seen. Bytes after the head are discarded: a subscriber has nothing
    /// more to say.
    pub fn process(&mut self, data: &[u8]) -> Result<Option<RequestHead>, HandshakeError> {
        if self.state != ServerState::ReadingRequest {
            return Ok(None);
        }

        self.buffer.extend_from_slice(data);

        match find(&self.buffer, HEAD_TERMINATOR) {
            Some(pos) if pos + HEAD_TERMINATOR.len() <= self.max_request_size => {
                let head = RequestHead::parse(&self.buffer[..pos])?;
                self.buffer.clear();
                self.state = ServerState::Done;
                Ok(Some(head))
            }
            Some(_) => Err(HandshakeError::RequestTooLarge),
            None if self.buffer.len() > self.max_request_size => {
                Err(HandshakeError::RequestTooLarge)
            }
            None => Ok(None),
        }
    }
}

impl Default for ServerHandshake {
    fn default() -> Self {
        Self::new()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn first_line(data: &[u8]) -> String {
    let end = find(data, CRLF).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}
