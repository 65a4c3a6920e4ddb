//! NTRIP protocol constants

/// Standard NTRIP caster port
pub const DEFAULT_PORT: u16 = 2101;

/// Mountpoint requested when none is configured
pub const DEFAULT_MOUNTPOINT: &str = "RTCM3";

/// Identity sent in the client's `User-Agent` header
pub const DEFAULT_USER_AGENT: &str = concat!("NTRIP ntrip-relay/", env!("CARGO_PKG_VERSION"));

/// Greeting sent by the server once a request is accepted
pub const GREETING: &[u8] = b"ICY 200 OK\r\n";

/// Prefix a valid greeting must start with
pub const GREETING_MARKER: &[u8] = b"ICY";

/// Line terminator
pub const CRLF: &[u8] = b"\r\n";

/// Blank line ending a request head
pub const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Relay read chunk size (both sides)
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Largest request head the server will buffer
pub const MAX_REQUEST_SIZE: usize = 4096;

/// Largest greeting the client will buffer while looking for the line end
pub const MAX_GREETING_SIZE: usize = 1024;

/// Response for a malformed request
pub const RESPONSE_BAD_REQUEST: &[u8] = b"HTTP/1.0 400 Bad Request\r\n\r\n";

/// Response for an unknown mountpoint
pub const RESPONSE_NOT_FOUND: &[u8] = b"HTTP/1.0 404 Not Found\r\n\r\n";

/// Response for missing or wrong credentials
pub const RESPONSE_UNAUTHORIZED: &[u8] =
    b"HTTP/1.0 401 Unauthorized\r\nWWW-Authenticate: Basic realm=\"ntrip\"\r\n\r\n";
