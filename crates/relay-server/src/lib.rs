//! # relay-server
//!
//! Server half of the relay protocol: the dispatch engine that routes
//! inbound command/query frames to registered handlers, fans broadcast
//! events out to pattern subscribers, and gates non-allow-listed names
//! behind a token-resolved identity.
//!
//! - Handler registries: replace-by-name command and query handlers
//! - Live session table and subscription index, owned by the [`Dispatcher`]
//! - Axum `/ws` gateway: upgrade, heartbeat, per-connection send queue
//! - `/health` endpoint and graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod errors;
pub mod health;
pub mod registry;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod subscriptions;
pub mod websocket;

pub use auth::{AllowList, StaticTokenVerifier, TokenVerifier};
pub use config::ServerConfig;
pub use context::HandlerContext;
pub use dispatch::{Dispatcher, EmitOutcome};
pub use errors::{HandlerError, ServerError};
pub use registry::{CommandHandler, HandlerRegistry, QueryHandler, RowSink};
pub use server::{RelayServer, ServerHandle};
pub use session::Session;
pub use shutdown::ShutdownCoordinator;
pub use subscriptions::SubscriptionIndex;
