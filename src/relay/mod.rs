//! Broadcast engine: source to subscribers fan-out

pub mod broadcast;

pub use broadcast::{Broadcaster, RoundOutcome};
