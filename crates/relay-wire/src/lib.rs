//! # relay-wire
//!
//! Wire-format model for the relay protocol: the [`Frame`] sum type, the
//! structural classifier that turns raw JSON payloads into frames, channel
//! [`Pattern`] matching, and branded identifier newtypes.
//!
//! One frame per WebSocket text message, JSON-object encoded.

#![deny(unsafe_code)]

pub mod errors;
pub mod frame;
pub mod ids;
pub mod pattern;

pub use errors::WireError;
pub use frame::Frame;
pub use ids::{CorrelationId, SessionId};
pub use pattern::Pattern;
