//! # relay-client
//!
//! Client half of the relay protocol: owns the outbound connection,
//! correlates in-flight commands and queries with their replies,
//! reconstructs ordered row streams, and fans broadcast events out to
//! pattern listeners. [`sync`](RelayClient::sync) and
//! [`sync_map`](RelayClient::sync_map) fold the event stream into reactive
//! state holders.

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
mod listeners;
pub mod stream;
pub mod sync;

pub use client::{ListenerHandle, RelayClient};
pub use errors::ClientError;
pub use stream::RowStream;
pub use sync::SyncState;
