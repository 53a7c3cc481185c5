//! `RelayServer` — Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::ws_handler;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The dispatch engine.
    pub dispatcher: Arc<Dispatcher>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started (monotonic, for uptime).
    pub start_time: Instant,
    /// When the server started (wall clock, for reporting).
    pub started_at: DateTime<Utc>,
    /// Server configuration.
    pub config: ServerConfig,
}

/// The relay server: one dispatcher behind an Axum router.
pub struct RelayServer {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    started_at: DateTime<Utc>,
}

impl RelayServer {
    /// Create a new server over a configured dispatcher.
    pub fn new(config: ServerConfig, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            dispatcher: Arc::new(dispatcher),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            dispatcher: self.dispatcher.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            started_at: self.started_at,
            config: self.config.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/ws", get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the configured address and serve in a background task.
    ///
    /// Returns a handle carrying the bound address (useful with port `0`)
    /// and a stop capability.
    pub async fn start(&self) -> Result<ServerHandle, ServerError> {
        let listener =
            tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "relay server listening");

        let router = self.router();
        let token = self.shutdown.token();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned());
            if let Err(err) = serve.await {
                error!(%err, "server task failed");
            }
        });

        Ok(ServerHandle {
            addr,
            task,
            shutdown: self.shutdown.clone(),
        })
    }

    /// The dispatch engine, for registering emits from application code.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// A running server bound to a concrete address.
pub struct ServerHandle {
    /// The bound socket address.
    pub addr: SocketAddr,
    task: JoinHandle<()>,
    shutdown: Arc<ShutdownCoordinator>,
}

impl ServerHandle {
    /// WebSocket URL for clients of this server.
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Trigger shutdown and wait briefly for the serve task to drain.
    ///
    /// Connections still open (long-lived WebSockets) keep the graceful
    /// path alive indefinitely, so the task is aborted after the grace
    /// period.
    pub async fn stop(mut self) {
        self.shutdown.trigger();
        let grace = std::time::Duration::from_millis(500);
        if tokio::time::timeout(grace, &mut self.task).await.is_err() {
            self.task.abort();
        }
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.dispatcher.session_count();
    Json(health::health_check(
        state.start_time,
        state.started_at,
        connections,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HandlerRegistry;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn make_server() -> RelayServer {
        RelayServer::new(
            ServerConfig::default(),
            Dispatcher::new(HandlerRegistry::new()),
        )
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = make_server().router();

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = make_server().router();

        let req = Request::builder()
            .uri("/nonexistent")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ws_route_rejects_plain_get() {
        // Without an Upgrade header the ws route refuses the request rather
        // than serving content.
        let app = make_server().router();

        let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_ne!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn start_binds_ephemeral_port() {
        let server = make_server();
        let handle = server.start().await.unwrap();
        assert_ne!(handle.addr.port(), 0);
        assert!(handle.ws_url().starts_with("ws://127.0.0.1:"));
        handle.stop().await;
    }

    #[test]
    fn shutdown_coordinator_accessible() {
        let server = make_server();
        assert!(!server.shutdown().is_triggered());
    }
}
