//! NTRIP caster side: accept subscribers and relay the source to them

pub mod config;
mod connection;
pub mod listener;

pub use config::ServerConfig;
pub use listener::NtripServer;
