//! Execution context passed to command and query handlers.

use std::sync::Arc;

use serde_json::Value;

use relay_wire::{Frame, SessionId};

use crate::session::Session;

/// Capabilities a handler body may use, scoped to the session whose frame
/// is being dispatched.
///
/// Handlers must not touch the dispatcher's tables directly; identity
/// adoption and per-connection pushes go through this context, and global
/// fan-out goes through [`Dispatcher::emit`](crate::dispatch::Dispatcher::emit).
pub struct HandlerContext {
    session: Arc<Session>,
}

impl HandlerContext {
    pub(crate) fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Id of the session this dispatch belongs to.
    pub fn session_id(&self) -> &SessionId {
        &self.session.id
    }

    /// The session's current identity, if any.
    pub fn identity(&self) -> Option<Value> {
        self.session.identity()
    }

    /// Adopt an identity for this session.
    ///
    /// Meaningful at most once per session, but a later call overwrites the
    /// earlier one; re-invocation is not guarded.
    pub fn adopt_identity(&self, identity: Value) {
        self.session.adopt_identity(identity);
    }

    /// Push an ad-hoc event to this one connection only.
    ///
    /// Bypasses the subscription index; for subscriber-wide broadcasts use
    /// the dispatcher's `emit`. Returns `false` if the frame could not be
    /// enqueued.
    pub fn push(&self, channel: impl Into<String>, payload: Value) -> bool {
        self.session.send(&Frame::event(channel, payload))
    }
}
