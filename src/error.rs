//! Error types for the ESL client, command encoder and event dispatch.

use thiserror::Error;

/// Errors raised by command encoding and by the transport.
///
/// Encoding failures ([`InvalidArgument`](Self::InvalidArgument)) are raised
/// before anything reaches the socket. Every other variant comes from the
/// connection or from the server's reply and is surfaced to the caller as-is;
/// nothing in this crate retries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EslError {
    /// A command argument cannot be put on the wire (e.g. embedded newline).
    #[error("invalid command argument: {message}")]
    InvalidArgument { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("not connected")]
    NotConnected,

    /// No connection is registered under the requested address.
    #[error("no connection registered for {addr}")]
    UnknownAddress { addr: String },

    #[error("authentication failed: {reason}")]
    AuthFailed { reason: String },

    #[error("protocol error: {message}")]
    ProtocolError { message: String },

    #[error("invalid header: {header}")]
    InvalidHeader { header: String },

    /// Server answered with `-ERR ...`.
    #[error("command failed: {reply_text}")]
    CommandFailed { reply_text: String },

    /// Reply-Text matched neither `+OK` nor `-ERR`.
    #[error("unexpected reply: {reply_text}")]
    UnexpectedReply { reply_text: String },

    /// A `bgapi` reply was accepted but carried no `Job-UUID`.
    #[error("bgapi reply did not carry a Job-UUID")]
    MissingJobUuid,

    /// Events were dropped because the consumer fell behind.
    #[error("event queue full, events dropped")]
    QueueFull,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EslError {
    pub fn protocol_error(message: impl Into<String>) -> Self {
        EslError::ProtocolError {
            message: message.into(),
        }
    }

    pub fn auth_failed(reason: impl Into<String>) -> Self {
        EslError::AuthFailed {
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        EslError::InvalidArgument {
            message: message.into(),
        }
    }

    /// `true` when the command was rejected before any transport call.
    pub fn is_encoding_error(&self) -> bool {
        matches!(self, EslError::InvalidArgument { .. })
    }

    /// `true` for connection, I/O and server-reply failures.
    pub fn is_transport_error(&self) -> bool {
        !self.is_encoding_error()
    }
}

/// Result alias used throughout the crate.
pub type EslResult<T> = Result<T, EslError>;

/// Failure reported by an [`EventHandler`](crate::dispatch::EventHandler).
///
/// The dispatcher logs it and moves on to the next handler.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an underlying error, keeping it as the `source()`.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<EslError> for HandlerError {
    fn from(err: EslError) -> Self {
        HandlerError::with_source("ESL operation failed", err)
    }
}

/// Return type of [`EventHandler::handle`](crate::dispatch::EventHandler::handle).
pub type HandlerResult = Result<(), HandlerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn encoding_vs_transport_classification() {
        assert!(EslError::invalid_argument("newline").is_encoding_error());
        assert!(!EslError::invalid_argument("newline").is_transport_error());
        assert!(EslError::NotConnected.is_transport_error());
        assert!(EslError::Timeout { timeout_ms: 5 }.is_transport_error());
        assert!(EslError::CommandFailed {
            reply_text: "-ERR no such channel".into()
        }
        .is_transport_error());
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            EslError::UnknownAddress {
                addr: "10.0.0.1:8021".into()
            }
            .to_string(),
            "no connection registered for 10.0.0.1:8021"
        );
        assert_eq!(
            EslError::Timeout { timeout_ms: 5000 }.to_string(),
            "operation timed out after 5000ms"
        );
    }

    #[test]
    fn handler_error_keeps_source() {
        let err: HandlerError = EslError::NotConnected.into();
        assert_eq!(err.message(), "ESL operation failed");
        assert_eq!(
            err.source()
                .map(|s| s.to_string()),
            Some("not connected".to_string())
        );
        assert!(HandlerError::new("boom")
            .source()
            .is_none());
    }
}
