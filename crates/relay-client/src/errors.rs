//! Client error type.

/// Errors surfaced to callers of the correlation engine.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The connection could not be established or the handshake failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The connection is gone; the operation was abandoned, not replayed.
    #[error("connection closed")]
    Disconnected,

    /// The server answered a command with an error frame.
    #[error("{0}")]
    Command(String),

    /// The server terminated a query stream with an error frame. Rows
    /// already pulled remain valid.
    #[error("{0}")]
    Query(String),
}
