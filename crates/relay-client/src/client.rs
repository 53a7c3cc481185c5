//! The correlation engine: connection ownership, command/query correlation,
//! and listener management.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use relay_wire::{CorrelationId, Frame};

use crate::errors::ClientError;
use crate::listeners::{Listener, ListenerRegistry};
use crate::stream::{RowSignal, RowStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Reply channel for an acknowledged command.
type PendingCommand = oneshot::Sender<Result<Value, String>>;

/// Client handle over one relay connection.
///
/// Cheap to clone via its inner `Arc`; all methods take `&self`.
#[derive(Clone)]
pub struct RelayClient {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    url: String,
    conn: tokio::sync::Mutex<ConnState>,
    out_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    pending_commands: Mutex<HashMap<String, PendingCommand>>,
    pending_queries: Mutex<HashMap<u64, mpsc::UnboundedSender<RowSignal>>>,
    listeners: ListenerRegistry,
    next_query_id: AtomicU64,
    activated: AtomicBool,
}

enum ConnState {
    Idle,
    Connected {
        profile: Option<Value>,
        reader: JoinHandle<()>,
        writer: JoinHandle<()>,
    },
}

impl RelayClient {
    /// Create a client for `url` (e.g. `ws://127.0.0.1:9000/ws?token=...`).
    ///
    /// No connection is opened until [`connect`](Self::connect).
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                url: url.into(),
                conn: tokio::sync::Mutex::new(ConnState::Idle),
                out_tx: Mutex::new(None),
                pending_commands: Mutex::new(HashMap::new()),
                pending_queries: Mutex::new(HashMap::new()),
                listeners: ListenerRegistry::default(),
                next_query_id: AtomicU64::new(1),
                activated: AtomicBool::new(false),
            }),
        }
    }

    // ── Connection lifecycle ────────────────────────────────────────

    /// Open the connection and wait for the server's identity announcement.
    ///
    /// The first classifiable inbound frame must be the `{profile}`
    /// announcement; anything arriving before it is a protocol violation
    /// and is ignored. Returns the announced identity, `None` for an
    /// anonymous session. Concurrent calls share one outcome: callers
    /// queue on the connection lock and later ones observe the
    /// already-established connection instead of opening a duplicate.
    pub async fn connect(&self) -> Result<Option<Value>, ClientError> {
        let mut conn = self.inner.conn.lock().await;

        if let ConnState::Connected { profile, .. } = &*conn {
            if self.inner.out_tx.lock().is_some() {
                return Ok(profile.clone());
            }
            // The transport died underneath a stale state; fall through and
            // reconnect fresh.
        }
        if let ConnState::Connected { reader, writer, .. } =
            std::mem::replace(&mut *conn, ConnState::Idle)
        {
            reader.abort();
            writer.abort();
        }

        let (ws, _) = connect_async(self.inner.url.as_str())
            .await
            .map_err(|err| ClientError::Connect(err.to_string()))?;
        let (ws_tx, mut ws_rx) = ws.split();

        let profile = wait_for_profile(&mut ws_rx).await?;

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_outbound(ws_tx, out_rx));
        let reader = tokio::spawn(route_inbound(ws_rx, self.inner.clone()));

        *self.inner.out_tx.lock() = Some(out_tx);
        *conn = ConnState::Connected {
            profile: profile.clone(),
            reader,
            writer,
        };
        Ok(profile)
    }

    /// Close the current connection (if any) and connect again.
    ///
    /// In-flight command and query registrations from before the disconnect
    /// are abandoned, not replayed; subscription activation is reset, so
    /// the application re-activates with [`subscribe`](Self::subscribe).
    pub async fn reconnect(&self) -> Result<Option<Value>, ClientError> {
        self.teardown().await;
        self.connect().await
    }

    /// Close the connection and abandon all in-flight registrations.
    pub async fn close(&self) {
        self.teardown().await;
    }

    async fn teardown(&self) {
        let mut conn = self.inner.conn.lock().await;
        if let ConnState::Connected { reader, writer, .. } =
            std::mem::replace(&mut *conn, ConnState::Idle)
        {
            reader.abort();
            writer.abort();
        }
        drop(conn);
        self.inner.connection_lost();
        self.inner.activated.store(false, Ordering::Relaxed);
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Send a fire-and-forget command.
    ///
    /// No ack flag is set: the handler's success is never observable here,
    /// by design. A handler failure still produces an error frame on the
    /// wire, but with no registered completion it is dropped on arrival.
    pub fn command(&self, name: impl Into<String>, data: Value) -> Result<(), ClientError> {
        self.inner
            .send_frame(&Frame::command(name, CorrelationId::new(), data, false))
    }

    /// Send a command with the ack flag set and await its completion.
    ///
    /// Resolves exactly once: with the handler's result, or with the error
    /// the server reported, or with [`ClientError::Disconnected`] if the
    /// connection dropped first.
    pub async fn command_with_ack(
        &self,
        name: impl Into<String>,
        data: Value,
    ) -> Result<Value, ClientError> {
        let cid = CorrelationId::new();
        let (tx, rx) = oneshot::channel();
        {
            let _ = self
                .inner
                .pending_commands
                .lock()
                .insert(cid.to_string(), tx);
        }

        let frame = Frame::command(name, cid.clone(), data, true);
        if let Err(err) = self.inner.send_frame(&frame) {
            let _ = self.inner.pending_commands.lock().remove(cid.as_str());
            return Err(err);
        }

        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(err)) => Err(ClientError::Command(err)),
            Err(_) => Err(ClientError::Disconnected),
        }
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Issue a query and return its row stream.
    ///
    /// The id is allocated from a per-client monotonic counter and is never
    /// reused while the stream is outstanding.
    pub fn query(
        &self,
        name: impl Into<String>,
        params: Option<Value>,
    ) -> Result<RowStream, ClientError> {
        let id = self.inner.next_query_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let _ = self.inner.pending_queries.lock().insert(id, tx);
        }

        let frame = Frame::Query {
            name: name.into(),
            id,
            params,
        };
        if let Err(err) = self.inner.send_frame(&frame) {
            let _ = self.inner.pending_queries.lock().remove(&id);
            return Err(err);
        }
        Ok(RowStream::new(rx))
    }

    // ── Event listeners ─────────────────────────────────────────────

    /// Register an event listener under a channel pattern.
    ///
    /// If this is the first listener for a previously-unseen pattern and
    /// subscriptions are already activated, a subscribe frame is sent
    /// immediately; otherwise the interest is recorded and deferred until
    /// [`subscribe`](Self::subscribe). The returned handle removes just
    /// this listener.
    pub fn on(
        &self,
        pattern: impl Into<String>,
        listener: impl Fn(&Value) + Send + Sync + 'static,
    ) -> ListenerHandle {
        let pattern = pattern.into();
        let (id, first) = self
            .inner
            .listeners
            .insert(&pattern, Arc::new(listener) as Listener);

        if first && self.inner.activated.load(Ordering::Relaxed) {
            let _ = self.inner.send_frame(&Frame::Subscribe {
                pattern: pattern.clone(),
            });
        }
        ListenerHandle {
            inner: self.inner.clone(),
            pattern,
            id,
        }
    }

    /// One-shot activation: send a subscribe frame for every registered
    /// pattern.
    ///
    /// Idempotent — a second call sends nothing. The register-then-activate
    /// split lets application code wire up all its listeners before any
    /// event can arrive, so no early event is missed.
    pub fn subscribe(&self) -> Result<(), ClientError> {
        if self.inner.activated.swap(true, Ordering::Relaxed) {
            return Ok(());
        }
        for pattern in self.inner.listeners.patterns() {
            self.inner.send_frame(&Frame::Subscribe { pattern })?;
        }
        Ok(())
    }

    pub(crate) fn inner(&self) -> &Arc<ClientInner> {
        &self.inner
    }
}

/// Deregistration capability for one listener.
pub struct ListenerHandle {
    inner: Arc<ClientInner>,
    pattern: String,
    id: u64,
}

impl ListenerHandle {
    /// The pattern this listener was registered under.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Remove this listener. Once the pattern has no listeners left, an
    /// unsubscribe frame is sent (only if activation has happened).
    pub fn off(self) {
        let last = self.inner.listeners.remove(&self.pattern, self.id);
        if last && self.inner.activated.load(Ordering::Relaxed) {
            let _ = self.inner.send_frame(&Frame::Unsubscribe {
                pattern: self.pattern.clone(),
            });
        }
    }
}

impl ClientInner {
    /// Enqueue a frame for the writer task.
    pub(crate) fn send_frame(&self, frame: &Frame) -> Result<(), ClientError> {
        match self.out_tx.lock().as_ref() {
            Some(tx) => tx
                .send(frame.encode())
                .map_err(|_| ClientError::Disconnected),
            None => Err(ClientError::Disconnected),
        }
    }

    /// Route one inbound frame to its correlation table entry.
    pub(crate) fn route(&self, frame: Frame) {
        match frame {
            Frame::CommandResult { cid, result } => {
                match self.pending_commands.lock().remove(&cid) {
                    Some(tx) => {
                        let _ = tx.send(Ok(result));
                    }
                    None => debug!(%cid, "result for unknown command"),
                }
            }
            Frame::CommandError { cid, err } => {
                match self.pending_commands.lock().remove(&cid) {
                    Some(tx) => {
                        let _ = tx.send(Err(err));
                    }
                    // Fire-and-forget commands register no completion; their
                    // failures are visible on the wire only.
                    None => debug!(%cid, %err, "error for unregistered command"),
                }
            }
            Frame::Row { id, row } => {
                if let Some(tx) = self.pending_queries.lock().get(&id) {
                    let _ = tx.send(RowSignal::Row(row));
                } else {
                    debug!(id, "row for unknown query");
                }
            }
            Frame::End { id } => {
                if let Some(tx) = self.pending_queries.lock().remove(&id) {
                    let _ = tx.send(RowSignal::End);
                }
            }
            Frame::QueryError { id, err } => {
                if let Some(tx) = self.pending_queries.lock().remove(&id) {
                    let _ = tx.send(RowSignal::Failed(err));
                }
            }
            Frame::Event { channel, data } => self.listeners.fan_out(&channel, &data),
            Frame::Profile { .. } => debug!("late profile announcement ignored"),
            other => debug!(?other, "ignoring non-server frame"),
        }
    }

    /// Drop the outbound channel and abandon every in-flight registration.
    pub(crate) fn connection_lost(&self) {
        *self.out_tx.lock() = None;
        // Dropping the senders resolves pending awaiters with a
        // disconnection error; nothing is replayed.
        self.pending_commands.lock().clear();
        self.pending_queries.lock().clear();
    }

    #[cfg(test)]
    pub(crate) fn pending_command_count(&self) -> usize {
        self.pending_commands.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn pending_query_count(&self) -> usize {
        self.pending_queries.lock().len()
    }
}

/// Read frames until the server's identity announcement arrives.
async fn wait_for_profile(
    ws_rx: &mut SplitStream<WsStream>,
) -> Result<Option<Value>, ClientError> {
    loop {
        match ws_rx.next().await {
            Some(Ok(Message::Text(text))) => match Frame::decode(text.as_str()) {
                Ok(Frame::Profile { profile }) => {
                    return Ok(if profile.is_null() { None } else { Some(profile) });
                }
                Ok(other) => debug!(?other, "ignoring pre-profile frame"),
                Err(err) => debug!(%err, "ignoring undecodable handshake payload"),
            },
            Some(Ok(Message::Close(_))) | None => {
                return Err(ClientError::Connect(
                    "connection closed during handshake".into(),
                ));
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => return Err(ClientError::Connect(err.to_string())),
        }
    }
}

/// Forward queued outbound frames to the socket.
async fn write_outbound(
    mut ws_tx: SplitSink<WsStream, Message>,
    mut out_rx: mpsc::UnboundedReceiver<String>,
) {
    while let Some(text) = out_rx.recv().await {
        if ws_tx.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }
}

/// Route inbound frames until the connection drops.
async fn route_inbound(mut ws_rx: SplitStream<WsStream>, inner: Arc<ClientInner>) {
    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => match Frame::decode(text.as_str()) {
                Ok(frame) => inner.route(frame),
                // Unclassifiable payloads are ignored, never fatal.
                Err(err) => debug!(%err, "ignoring undecodable payload"),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                debug!(%err, "transport error");
                break;
            }
        }
    }
    inner.connection_lost();
    if let Ok(mut conn) = inner.conn.try_lock() {
        *conn = ConnState::Idle;
    }
}
