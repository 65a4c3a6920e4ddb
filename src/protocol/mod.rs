//! NTRIP wire protocol
//!
//! The protocol is a single HTTP/1.0-style exchange followed by raw bytes:
//!
//! ```text
//! Client                                          Server
//!   |--- GET /<mountpoint> HTTP/1.0 ------------->|
//!   |--- [Authorization: Basic <b64>] ----------->|
//!   |--- User-Agent / Connection: close / CRLF -->|
//!   |                                             |
//!   |<-- ICY 200 OK ------------------------------|
//!   |<== raw correction bytes until close ========|
//! ```

pub mod constants;
pub mod handshake;

pub use handshake::{ClientHandshake, ClientRequest, RequestHead, ServerHandshake};
