//! Wire codec error type.

/// Errors produced while encoding or classifying wire payloads.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The payload is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload is not a JSON object.
    #[error("frame must be a JSON object")]
    NotAnObject,

    /// The payload is a JSON object but matches no known frame shape.
    ///
    /// Receivers treat this as "ignore the message", not as a fatal error.
    #[error("payload matches no known frame shape")]
    Unclassifiable,
}
