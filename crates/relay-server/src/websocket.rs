//! WebSocket gateway — upgrade, per-connection send queue, heartbeat, and
//! frame dispatch from connect through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use relay_wire::Frame;

use crate::dispatch::Dispatcher;
use crate::server::AppState;

/// Interval between server-initiated Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong before considering the client dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(90);

/// Connection parameters supplied out-of-band with the upgrade request.
#[derive(Debug, Deserialize)]
pub struct WsConnectParams {
    /// Authorization token, resolved once by the token verifier.
    pub token: Option<String>,
}

/// GET /ws — upgrade and run the session until disconnect.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsConnectParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let capacity = state.config.send_queue_capacity;
    ws.on_upgrade(move |socket| run_ws_session(socket, state.dispatcher, params.token, capacity))
}

/// Run one WebSocket session.
///
/// 1. Admits the session (token verification + `{profile}` announcement)
/// 2. Forwards queued outbound frames and periodic Ping frames
/// 3. Decodes inbound text frames and hands them to the dispatcher
/// 4. Cleans the session out of the dispatcher's tables on disconnect
pub async fn run_ws_session(
    ws: WebSocket,
    dispatcher: Arc<Dispatcher>,
    token: Option<String>,
    send_queue_capacity: usize,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<String>(send_queue_capacity);
    let session = dispatcher.connect(send_tx, token.as_deref()).await;
    let session_id = session.id.clone();

    let connection_start = std::time::Instant::now();
    info!(%session_id, "client connected");
    counter!("relay_ws_connections_total").increment(1);
    gauge!("relay_ws_connections_active").increment(1.0);

    // Outbound forwarder with periodic Ping frames.
    let outbound_session = session.clone();
    let outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(PING_INTERVAL);
        // Skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if !outbound_session.check_alive()
                        && outbound_session.last_pong_elapsed() > PONG_TIMEOUT
                    {
                        warn!("client unresponsive for {PONG_TIMEOUT:?}, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Inbound loop: one frame per text message.
    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            Message::Text(text) => {
                session.mark_alive();
                match Frame::decode(text.as_str()) {
                    Ok(frame) => dispatcher.dispatch(&session, frame),
                    // Malformed payloads are ignored, never fatal.
                    Err(err) => {
                        debug!(%session_id, %err, "ignoring undecodable payload");
                    }
                }
            }
            Message::Ping(_) | Message::Pong(_) => session.mark_alive(),
            Message::Close(_) => {
                info!(%session_id, "client sent close frame");
                break;
            }
            Message::Binary(data) => {
                debug!(%session_id, len = data.len(), "binary frames are not part of the protocol");
            }
        }
    }

    info!(%session_id, "client disconnected");
    counter!("relay_ws_disconnections_total").increment(1);
    gauge!("relay_ws_connections_active").decrement(1.0);
    histogram!("relay_ws_connection_duration_seconds")
        .record(connection_start.elapsed().as_secs_f64());
    outbound.abort();
    dispatcher.disconnect(&session.id);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Session behavior over a real socket is covered by tests/integration.rs;
    // these validate the upgrade parameters.

    #[test]
    fn connect_params_with_token() {
        let params: WsConnectParams = serde_json::from_str(r#"{"token":"t-1"}"#).unwrap();
        assert_eq!(params.token.as_deref(), Some("t-1"));
    }

    #[test]
    fn connect_params_token_is_optional() {
        let params: WsConnectParams = serde_json::from_str("{}").unwrap();
        assert!(params.token.is_none());
    }
}
