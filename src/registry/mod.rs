//! Subscriber registry
//!
//! Holds the write side of every connection that completed the handshake.
//! Three kinds of tasks touch it concurrently:
//!
//! ```text
//!   accept/connection tasks ── add() ──┐
//!                                      ▼
//!                     ┌──────────────────────────────┐
//!                     │ Mutex<HashMap<Id, Arc<Sub>>> │
//!                     └──────────────────────────────┘
//!                        ▲                      │ snapshot
//!   connection tasks ── remove() on EOF         ▼
//!                                  broadcaster for_each() ──► write_chunk()
//! ```
//!
//! Chunks are `bytes::Bytes`, so every subscriber write in a round shares
//! the same allocation.

pub mod store;
pub mod subscriber;

pub use store::SubscriberRegistry;
pub use subscriber::{Subscriber, SubscriberId};
