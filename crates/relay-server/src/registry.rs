//! Handler traits and the name → handler registries.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use relay_wire::Frame;

use crate::context::HandlerContext;
use crate::errors::HandlerError;
use crate::session::Session;

/// Trait implemented by every command (write) handler.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Execute the command with the given payload and context.
    ///
    /// The returned value reaches the caller only if the command carried
    /// the ack flag; an error always produces a wire-visible error frame.
    async fn handle(&self, data: Value, ctx: &HandlerContext) -> Result<Value, HandlerError>;
}

/// Trait implemented by every query (streamed read) handler.
#[async_trait]
pub trait QueryHandler: Send + Sync {
    /// Execute the query, pushing result rows through `rows` in order.
    ///
    /// Returning `Ok` terminates the stream cleanly; returning `Err` after
    /// any number of rows replaces the end frame with a stream error — rows
    /// already pushed remain valid on the consumer side.
    async fn handle(
        &self,
        params: Option<Value>,
        ctx: &HandlerContext,
        rows: &RowSink,
    ) -> Result<(), HandlerError>;
}

/// Ordered row transmitter for one query invocation.
///
/// Rows are transmitted as they are pushed; the sink awaits send-queue
/// capacity rather than dropping, so the per-query ordering and completeness
/// guarantees hold end to end.
pub struct RowSink {
    id: u64,
    session: Arc<Session>,
}

impl RowSink {
    pub(crate) fn new(id: u64, session: Arc<Session>) -> Self {
        Self { id, session }
    }

    /// Transmit one row.
    pub async fn push(&self, row: Value) -> Result<(), HandlerError> {
        if self
            .session
            .send_queued(&Frame::Row { id: self.id, row })
            .await
        {
            Ok(())
        } else {
            Err(HandlerError::ConnectionClosed)
        }
    }
}

/// Registries mapping command and query names to handlers.
///
/// Registration is replace-by-name and happens during setup, before traffic
/// arrives; the registries are read-only afterwards.
#[derive(Default)]
pub struct HandlerRegistry {
    commands: HashMap<String, Arc<dyn CommandHandler>>,
    queries: HashMap<String, Arc<dyn QueryHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command handler, replacing any previous one of that name.
    pub fn register_command(&mut self, name: &str, handler: impl CommandHandler + 'static) {
        let _ = self.commands.insert(name.to_owned(), Arc::new(handler));
    }

    /// Register a query handler, replacing any previous one of that name.
    pub fn register_query(&mut self, name: &str, handler: impl QueryHandler + 'static) {
        let _ = self.queries.insert(name.to_owned(), Arc::new(handler));
    }

    /// Look up a command handler.
    pub fn command(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.commands.get(name).cloned()
    }

    /// Look up a query handler.
    pub fn query(&self, name: &str) -> Option<Arc<dyn QueryHandler>> {
        self.queries.get(name).cloned()
    }

    /// All registered command names (sorted).
    pub fn command_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.keys().cloned().collect();
        names.sort();
        names
    }

    /// All registered query names (sorted).
    pub fn query_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queries.keys().cloned().collect();
        names.sort();
        names
    }
}
