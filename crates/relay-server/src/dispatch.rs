//! The dispatch engine: routes inbound frames to handlers and outbound
//! events to matching sessions.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use relay_wire::{Frame, Pattern, SessionId};

use crate::auth::{AllowList, TokenVerifier};
use crate::context::HandlerContext;
use crate::registry::{HandlerRegistry, RowSink};
use crate::session::Session;
use crate::subscriptions::SubscriptionIndex;

/// Per-emit delivery tally.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct EmitOutcome {
    /// Sessions whose subscriptions matched the channel.
    pub matched: usize,
    /// Events enqueued successfully.
    pub delivered: usize,
    /// Deliveries that failed (dead session or full queue).
    pub failed: usize,
}

/// Owns the handler registries, the live session table, the subscription
/// index, and the authorization gate.
///
/// One dispatcher instance serves any number of connections; construct it
/// once and hand an `Arc` to each connection task. All tables carry their
/// own locks — connection tasks run concurrently.
pub struct Dispatcher {
    registry: HandlerRegistry,
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    index: SubscriptionIndex,
    verifier: Option<Arc<dyn TokenVerifier>>,
    allow_list: AllowList,
}

impl Dispatcher {
    /// Create a dispatcher over a fully-populated registry.
    ///
    /// Handlers are registered during setup; the registry is immutable once
    /// the dispatcher exists.
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry,
            sessions: RwLock::new(HashMap::new()),
            index: SubscriptionIndex::new(),
            verifier: None,
            allow_list: AllowList::new(),
        }
    }

    /// Install the token verification hook.
    #[must_use]
    pub fn with_verifier(mut self, verifier: impl TokenVerifier + 'static) -> Self {
        self.verifier = Some(Arc::new(verifier));
        self
    }

    /// Install the set of names exempt from authorization.
    #[must_use]
    pub fn with_allow_list(mut self, allow_list: AllowList) -> Self {
        self.allow_list = allow_list;
        self
    }

    // ── Session lifecycle ───────────────────────────────────────────

    /// Admit a new connection.
    ///
    /// If a token was supplied and the verifier resolves it, the session
    /// starts authenticated; otherwise it is anonymous — anonymous sessions
    /// are legal and may call allow-listed names. Either way the session
    /// enters the live table and the `{profile}` announcement is sent as
    /// the connection's first outbound frame.
    pub async fn connect(&self, tx: mpsc::Sender<String>, token: Option<&str>) -> Arc<Session> {
        let identity = match (token, &self.verifier) {
            (Some(token), Some(verifier)) => verifier.verify(token).await,
            _ => None,
        };

        let session = Arc::new(Session::new(SessionId::new(), tx));
        if let Some(identity) = &identity {
            session.adopt_identity(identity.clone());
        }
        let _ = self
            .sessions
            .write()
            .insert(session.id.clone(), session.clone());

        debug!(session_id = %session.id, authenticated = identity.is_some(), "session connected");
        let profile = identity.unwrap_or(Value::Null);
        let _ = session.send_queued(&Frame::Profile { profile }).await;
        session
    }

    /// Remove a session from the live table and purge its subscriptions.
    pub fn disconnect(&self, id: &SessionId) {
        let _ = self.sessions.write().remove(id);
        self.index.remove_session(id);
        debug!(session_id = %id, "session disconnected");
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Number of distinct patterns in the subscription index.
    pub fn subscribed_pattern_count(&self) -> usize {
        self.index.pattern_count()
    }

    // ── Inbound routing ─────────────────────────────────────────────

    /// Route one inbound frame from `session`.
    ///
    /// Commands and queries each run in their own spawned task, so
    /// exchanges on one connection may complete out of submission order;
    /// only the row stream within a single query id is ordered.
    pub fn dispatch(&self, session: &Arc<Session>, frame: Frame) {
        match frame {
            Frame::Command {
                name,
                cid,
                data,
                ack,
            } => self.dispatch_command(session, name, cid, data, ack),
            Frame::Query { name, id, params } => self.dispatch_query(session, name, id, params),
            Frame::Subscribe { pattern } => {
                let pattern = Pattern::new(pattern);
                let _ = session.add_pattern(pattern.clone());
                self.index.subscribe(pattern, session.id.clone());
            }
            Frame::Unsubscribe { pattern } => {
                let pattern = Pattern::new(pattern);
                let _ = session.remove_pattern(&pattern);
                self.index.unsubscribe(&pattern, &session.id);
            }
            // Server-to-client frames have no business arriving inbound.
            other => {
                debug!(session_id = %session.id, ?other, "ignoring non-client frame");
            }
        }
    }

    fn dispatch_command(
        &self,
        session: &Arc<Session>,
        name: String,
        cid: String,
        data: Value,
        ack: bool,
    ) {
        counter!("relay_commands_total", "name" => name.clone()).increment(1);

        let Some(handler) = self.registry.command(&name) else {
            self.answer_command_error(session, cid, format!("Unknown command: {name}"));
            return;
        };
        if let Some(err) = self.authorize(session, &name) {
            self.answer_command_error(session, cid, err);
            return;
        }

        let session = session.clone();
        let _ = tokio::spawn(async move {
            let ctx = HandlerContext::new(session.clone());
            match handler.handle(data, &ctx).await {
                // Success is reported only when the caller asked for it.
                Ok(result) if ack => {
                    let _ = session.send_queued(&Frame::CommandResult { cid, result }).await;
                }
                Ok(_) => {}
                // Failure visibility is not optional.
                Err(err) => {
                    warn!(name, %err, "command handler failed");
                    counter!("relay_command_errors_total", "name" => name).increment(1);
                    let _ = session
                        .send_queued(&Frame::CommandError {
                            cid,
                            err: err.to_string(),
                        })
                        .await;
                }
            }
        });
    }

    fn dispatch_query(
        &self,
        session: &Arc<Session>,
        name: String,
        id: u64,
        params: Option<Value>,
    ) {
        counter!("relay_queries_total", "name" => name.clone()).increment(1);

        let Some(handler) = self.registry.query(&name) else {
            self.answer_query_error(session, id, format!("Unknown query: {name}"));
            return;
        };
        if let Some(err) = self.authorize(session, &name) {
            self.answer_query_error(session, id, err);
            return;
        }

        let session = session.clone();
        let _ = tokio::spawn(async move {
            let ctx = HandlerContext::new(session.clone());
            let sink = RowSink::new(id, session.clone());
            match handler.handle(params, &ctx, &sink).await {
                Ok(()) => {
                    let _ = session.send_queued(&Frame::End { id }).await;
                }
                // Rows already transmitted remain valid; the error replaces
                // the end frame.
                Err(err) => {
                    warn!(name, %err, "query handler failed");
                    counter!("relay_query_errors_total", "name" => name).increment(1);
                    let _ = session
                        .send_queued(&Frame::QueryError {
                            id,
                            err: err.to_string(),
                        })
                        .await;
                }
            }
        });
    }

    /// `None` if the session may call `name`, else the refusal message.
    fn authorize(&self, session: &Arc<Session>, name: &str) -> Option<String> {
        if self.allow_list.is_allowed(name) || session.is_authenticated() {
            None
        } else {
            Some("Not authenticated".to_owned())
        }
    }

    fn answer_command_error(&self, session: &Arc<Session>, cid: String, err: String) {
        let session = session.clone();
        let _ = tokio::spawn(async move {
            let _ = session.send_queued(&Frame::CommandError { cid, err }).await;
        });
    }

    fn answer_query_error(&self, session: &Arc<Session>, id: u64, err: String) {
        let session = session.clone();
        let _ = tokio::spawn(async move {
            let _ = session.send_queued(&Frame::QueryError { id, err }).await;
        });
    }

    // ── Outbound fan-out ────────────────────────────────────────────

    /// Broadcast an event to every live session with a matching pattern.
    ///
    /// Delivery is best-effort per recipient: a full queue or dead session
    /// never stalls the others.
    pub fn emit(&self, channel: &str, payload: Value) -> EmitOutcome {
        let targets = self.index.matching(channel);
        let sessions = self.sessions.read();
        let frame = Frame::event(channel, payload);

        let mut outcome = EmitOutcome {
            matched: targets.len(),
            ..EmitOutcome::default()
        };
        for id in &targets {
            match sessions.get(id) {
                Some(session) if session.send(&frame) => outcome.delivered += 1,
                _ => outcome.failed += 1,
            }
        }
        counter!("relay_events_total", "channel" => channel.to_owned()).increment(1);
        debug!(channel, outcome.matched, outcome.delivered, "event emitted");
        outcome
    }
}
