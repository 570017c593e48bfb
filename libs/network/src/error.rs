//! Communication Error Types
//!
//! One taxonomy for every device link of the workstation: the RTDE session,
//! the text fallback, the streaming client, the listener and the downstream
//! request/acknowledge exchange.

use codec::ProtocolError;
use thiserror::Error;

/// Main communication error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommunicationError {
    /// Operation exceeded its deadline
    #[error("Timeout error: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Peer closed the connection before the exchange completed
    #[error("Connection closed: {context}")]
    ConnectionClosed { context: String },

    /// Length or field invariants of a frame were violated
    #[error("Malformed frame: {message}")]
    MalformedFrame { message: String },

    /// No candidate protocol version was accepted by the peer
    #[error("Protocol version rejected: peer refused versions {tried:?}")]
    ProtocolVersionRejected { tried: Vec<u16> },

    /// Peer refused the requested output recipe
    #[error("Setup rejected: {reason}")]
    SetupRejected { reason: String },

    /// Peer did not confirm the start of streaming
    #[error("Start rejected: {message}")]
    StartRejected { message: String },

    /// Data frame belongs to a different recipe than negotiated
    #[error("Recipe mismatch: expected recipe {expected}, got {got}")]
    RecipeMismatch { expected: u8, got: u8 },

    /// A well-formed frame of the wrong type arrived
    #[error("Unexpected frame: {message}")]
    UnexpectedFrame { message: String },

    /// Text reply could not be turned into a value
    #[error("Unparsable reply: {reason} (reply: {reply:?})")]
    UnparsableReply { reason: String, reply: String },

    /// External lookup collaborator failed
    #[error("Lookup failed: {message}")]
    LookupFailed { message: String },

    /// Downstream peer answered with something other than the expected token
    #[error("Acknowledgement mismatch: expected {expected:?}, got {got:?}")]
    AcknowledgementMismatch { expected: String, got: String },

    /// Invalid or missing configuration value
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Generic I/O errors
    #[error("I/O error ({kind:?}): {message}")]
    Io {
        kind: std::io::ErrorKind,
        message: String,
    },
}

/// Result type alias for communication operations
pub type Result<T> = std::result::Result<T, CommunicationError>;

impl CommunicationError {
    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn connection_closed(context: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            context: context.into(),
        }
    }

    pub fn unparsable(reason: impl Into<String>, reply: impl Into<String>) -> Self {
        Self::UnparsableReply {
            reason: reason.into(),
            reply: reply.into(),
        }
    }

    pub fn lookup_failed(message: impl Into<String>) -> Self {
        Self::LookupFailed {
            message: message.into(),
        }
    }

    pub fn acknowledgement_mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::AcknowledgementMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// Wrap an I/O error, adding the operation to the message
    pub fn io(operation: &str, error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe => Self::connection_closed(format!("{operation}: {error}")),
            kind => Self::Io {
                kind,
                message: format!("{operation}: {error}"),
            },
        }
    }

    /// Check if a later attempt may succeed without intervention
    pub fn is_retryable(&self) -> bool {
        match self {
            CommunicationError::Timeout { .. } => true,
            CommunicationError::ConnectionClosed { .. } => true,
            CommunicationError::Io { .. } => true,
            CommunicationError::LookupFailed { .. } => true,
            CommunicationError::AcknowledgementMismatch { .. } => true,
            CommunicationError::MalformedFrame { .. } => false,
            CommunicationError::ProtocolVersionRejected { .. } => false,
            CommunicationError::SetupRejected { .. } => false,
            CommunicationError::StartRejected { .. } => false,
            CommunicationError::RecipeMismatch { .. } => false,
            CommunicationError::UnexpectedFrame { .. } => false,
            CommunicationError::UnparsableReply { .. } => false,
            CommunicationError::Configuration { .. } => false,
        }
    }

    /// Get error category for logs and activity events
    pub fn category(&self) -> &'static str {
        match self {
            CommunicationError::Timeout { .. } => "timeout",
            CommunicationError::ConnectionClosed { .. } => "connection",
            CommunicationError::Io { .. } => "io",
            CommunicationError::MalformedFrame { .. }
            | CommunicationError::UnexpectedFrame { .. }
            | CommunicationError::RecipeMismatch { .. } => "protocol",
            CommunicationError::ProtocolVersionRejected { .. }
            | CommunicationError::SetupRejected { .. }
            | CommunicationError::StartRejected { .. } => "handshake",
            CommunicationError::UnparsableReply { .. } => "parse",
            CommunicationError::LookupFailed { .. } => "lookup",
            CommunicationError::AcknowledgementMismatch { .. } => "acknowledgement",
            CommunicationError::Configuration { .. } => "configuration",
        }
    }
}

/// Convert standard I/O errors to communication errors
impl From<std::io::Error> for CommunicationError {
    fn from(error: std::io::Error) -> Self {
        Self::io("socket", error)
    }
}

impl From<ProtocolError> for CommunicationError {
    fn from(error: ProtocolError) -> Self {
        match error {
            ProtocolError::ConnectionClosed { context } => Self::connection_closed(context),
            ProtocolError::Timeout {
                timeout_ms,
                context,
            } => Self::Timeout {
                operation: context,
                timeout_ms,
            },
            ProtocolError::Io { kind, message } => Self::Io { kind, message },
            ProtocolError::UnexpectedFrame { .. } => Self::UnexpectedFrame {
                message: error.to_string(),
            },
            ProtocolError::MalformedFrame { .. }
            | ProtocolError::MessageTooSmall { .. }
            | ProtocolError::PayloadTooLarge { .. } => Self::MalformedFrame {
                message: error.to_string(),
            },
        }
    }
}
