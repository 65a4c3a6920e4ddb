//! NTRIP client implementation
//!
//! Pulls a mountpoint from a caster (this crate's server or any NTRIP v1
//! caster) into a local sink, for:
//! - Recording corrections to a file
//! - Feeding a live display through the sink mirror

pub mod config;
pub mod puller;
pub mod session;
pub mod sink;

pub use config::ClientConfig;
pub use puller::NtripClient;
pub use session::RelaySession;
pub use sink::{RelaySink, Sink};
