//! Server and handler error types.

/// Error returned by command and query handler bodies.
///
/// Whatever the variant, the dispatcher converts it to a protocol-level
/// error frame; handler failures never tear down the connection.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Required parameter missing or of the wrong type.
    #[error("{message}")]
    InvalidParams {
        /// Description of what is wrong.
        message: String,
    },

    /// Requested resource does not exist.
    #[error("{message}")]
    NotFound {
        /// Human-readable message.
        message: String,
    },

    /// Unexpected failure inside the handler body.
    #[error("{message}")]
    Internal {
        /// Description.
        message: String,
    },

    /// The session's outbound channel is gone; the consumer will never see
    /// further rows.
    #[error("connection closed")]
    ConnectionClosed,
}

impl HandlerError {
    /// Build an [`HandlerError::InvalidParams`].
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Build an [`HandlerError::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Build an [`HandlerError::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Errors surfaced by the server transport itself.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind or serve on the configured address.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}
