//! Activity events emitted by the listener, stream client and payload pipeline.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    ListenerStarted,
    ListenerStopped,
    ClientConnected,
    MessageReceived,
    ResponseSent,
    MessageSent,
    ResponseReceived,
    StreamConnected,
    StreamDisconnected,
    ClientError,
    SendError,
    System,
}

impl EventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            EventKind::ListenerStarted => "LISTENER_STARTED",
            EventKind::ListenerStopped => "LISTENER_STOPPED",
            EventKind::ClientConnected => "CLIENT_CONNECTED",
            EventKind::MessageReceived => "MESSAGE_RECEIVED",
            EventKind::ResponseSent => "RESPONSE_SENT",
            EventKind::MessageSent => "MESSAGE_SENT",
            EventKind::ResponseReceived => "RESPONSE_RECEIVED",
            EventKind::StreamConnected => "STREAM_CONNECTED",
            EventKind::StreamDisconnected => "STREAM_DISCONNECTED",
            EventKind::ClientError => "CLIENT_ERROR",
            EventKind::SendError => "SEND_ERROR",
            EventKind::System => "SYSTEM",
        }
    }

    pub const fn is_error(self) -> bool {
        matches!(self, EventKind::ClientError | EventKind::SendError)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the activity log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub timestamp: DateTime<Local>,
    pub kind: EventKind,
    pub message: String,
    /// Peer address or component name
    pub source: String,
}

impl ActivityEvent {
    pub fn new(kind: EventKind, message: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            kind,
            message: message.into(),
            source: source.into(),
        }
    }

    /// `[HH:MM:SS] KIND source: message`
    pub fn render(&self) -> String {
        format!(
            "[{}] {} {}: {}",
            self.timestamp.format("%H:%M:%S"),
            self.kind,
            self.source,
            self.message
        )
    }
}
