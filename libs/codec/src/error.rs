//! Protocol-level errors for RTDE frame processing
//!
//! Every variant carries enough context to diagnose a misbehaving peer from the
//! log line alone: the offending length, the frame type that arrived, and what
//! the decoder expected instead.

use thiserror::Error;

/// Frame decoding and stream-reading errors
///
/// The type is `Clone + PartialEq` so tests can compare errors directly; I/O
/// failures are therefore flattened to their kind and message.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    /// Header or payload violates the framing invariants
    #[error("Malformed frame: {reason} (declared length: {length})")]
    MalformedFrame { length: u16, reason: String },

    /// Buffer is too small to contain the expected structure
    #[error("Message too small: need {need} bytes, got {got} (context: {context})")]
    MessageTooSmall {
        need: usize,
        got: usize,
        context: String,
    },

    /// A valid frame of the wrong type arrived during a handshake step
    #[error("Unexpected frame: expected {expected}, got {got_name} (0x{got:02X}) during {stage}")]
    UnexpectedFrame {
        expected: String,
        got: u8,
        got_name: String,
        stage: String,
    },

    /// Payload does not fit in the 16-bit length field
    #[error("Payload too large: {size} bytes exceeds limit {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Peer closed the stream before a complete frame arrived
    #[error("Connection closed while reading {context}")]
    ConnectionClosed { context: String },

    /// Read or write exceeded its deadline
    #[error("Timed out after {timeout_ms}ms while {context}")]
    Timeout { timeout_ms: u64, context: String },

    /// Any other stream failure
    #[error("I/O error ({kind:?}): {message}")]
    Io {
        kind: std::io::ErrorKind,
        message: String,
    },
}

impl ProtocolError {
    pub fn malformed(length: u16, reason: impl Into<String>) -> Self {
        Self::MalformedFrame {
            length,
            reason: reason.into(),
        }
    }

    pub fn message_too_small(need: usize, got: usize, context: impl Into<String>) -> Self {
        Self::MessageTooSmall {
            need,
            got,
            context: context.into(),
        }
    }

    /// Create an UnexpectedFrame error naming both frame types
    pub fn unexpected_frame(expected: u8, got: u8, stage: impl Into<String>) -> Self {
        Self::UnexpectedFrame {
            expected: crate::frame::type_name(expected).to_string(),
            got,
            got_name: crate::frame::type_name(got).to_string(),
            stage: stage.into(),
        }
    }

    pub fn timeout(timeout: std::time::Duration, context: impl Into<String>) -> Self {
        Self::Timeout {
            timeout_ms: timeout.as_millis() as u64,
            context: context.into(),
        }
    }

    /// Translate an I/O error from a frame read bounded by `timeout`
    ///
    /// `UnexpectedEof` is what `read_exact` reports when the peer closes the
    /// stream mid-frame, so it maps to [`ProtocolError::ConnectionClosed`]. An
    /// OS-level timeout is reported against the caller's bound.
    pub fn from_io(err: std::io::Error, context: &str, timeout: std::time::Duration) -> Self {
        Self::classify_io(err, context, Some(timeout))
    }

    fn classify_io(
        err: std::io::Error,
        context: &str,
        timeout: Option<std::time::Duration>,
    ) -> Self {
        use std::io::ErrorKind;

        match (err.kind(), timeout) {
            (
                ErrorKind::UnexpectedEof
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe,
                _,
            ) => Self::ConnectionClosed {
                context: context.to_string(),
            },
            (ErrorKind::TimedOut | ErrorKind::WouldBlock, Some(timeout)) => {
                Self::timeout(timeout, context)
            }
            (kind, _) => Self::Io {
                kind,
                message: err.to_string(),
            },
        }
    }
}

/// Without a known bound a timeout stays an I/O error
impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        Self::classify_io(err, "stream", None)
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
