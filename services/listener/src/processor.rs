//! # Payload Processor
//!
//! ## Pipeline
//!
//! ```text
//! payload ─► identifier (regex) ─► ProductLookup ─► reply "CODE:VALUE_..." ─► cobot
//!               │ none                  │ error          or "NichtVorhanden"     │ "OK"?
//!               └─► CLIENT_ERROR        └─► CLIENT_ERROR                         └─► SEND_ERROR on failure
//! ```
//!
//! Every outcome is reported through the shared [`ActivityLog`]; nothing here
//! fails the listener that delivered the payload.

use crate::catalog::ProductLookup;
use async_trait::async_trait;
use network::{
    send_with_ack, ActivityLog, CommunicationError, MessageHandler, PeerAddress, END_MARKER,
};
use once_cell::sync::Lazy;
use regex::Regex;
use station_config::DownstreamSettings;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use types::{format_reply, EventKind, ProductField, ProductRecord};

/// Product identifiers: `WU`, optional letters or hyphens, digits, optional suffix
pub const DEFAULT_IDENTIFIER_PATTERN: &str = r"(?i)\bWU[A-Z-]*\d+[A-Z0-9]*\b";

/// Acknowledgement expected from the cobot
pub const DOWNSTREAM_ACK: &str = "OK";

const SOURCE: &str = "processor";

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(DEFAULT_IDENTIFIER_PATTERN).expect("static regex"));

/// Where and how replies are delivered
#[derive(Debug, Clone, PartialEq)]
pub struct DownstreamConfig {
    pub peer: PeerAddress,
    pub timeout: Duration,
    /// Wait for [`DOWNSTREAM_ACK`] after sending
    pub read_ack: bool,
    /// Append `END` before the newline
    pub append_end_marker: bool,
}

impl DownstreamConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            peer: PeerAddress::new(host, port),
            timeout: Duration::from_secs(5),
            read_ack: true,
            append_end_marker: false,
        }
    }

    pub fn from_settings(settings: &DownstreamSettings) -> Self {
        Self {
            peer: PeerAddress::new(settings.host.clone(), settings.port),
            timeout: settings.timeout(),
            read_ack: settings.read_ack,
            append_end_marker: settings.append_end_marker,
        }
    }
}

/// What happened to one payload
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// Nothing matching the identifier pattern
    NoIdentifier,
    /// The lookup itself failed; nothing was sent
    LookupFailed {
        identifier: String,
        error: CommunicationError,
    },
    /// Reply sent and, if requested, acknowledged
    Delivered { identifier: String, reply: String },
    /// Reply built but the round trip failed
    DeliveryFailed {
        identifier: String,
        reply: String,
        error: CommunicationError,
    },
}

pub struct PayloadProcessor {
    pattern: Regex,
    fields: Vec<ProductField>,
    lookup: Arc<dyn ProductLookup>,
    downstream: DownstreamConfig,
    log: Arc<ActivityLog>,
}

impl PayloadProcessor {
    pub fn new(
        lookup: Arc<dyn ProductLookup>,
        downstream: DownstreamConfig,
        log: Arc<ActivityLog>,
    ) -> Self {
        Self {
            pattern: IDENTIFIER.clone(),
            fields: ProductField::ALL.to_vec(),
            lookup,
            downstream,
            log,
        }
    }

    /// Restrict or reorder the reply fields
    pub fn with_fields(mut self, fields: Vec<ProductField>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_identifier_pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.pattern = Regex::new(pattern)?;
        Ok(self)
    }

    pub fn downstream(&self) -> &DownstreamConfig {
        &self.downstream
    }

    /// First identifier token anywhere in `text`
    pub fn extract_identifier(&self, text: &str) -> Option<String> {
        self.pattern.find(text).map(|m| m.as_str().to_string())
    }

    pub fn build_reply(&self, record: Option<&ProductRecord>) -> String {
        format_reply(record, &self.fields)
    }

    /// Reply as written to the socket
    pub fn wire_message(&self, reply: &str) -> String {
        if self.downstream.append_end_marker {
            format!("{reply}{END_MARKER}\n")
        } else {
            format!("{reply}\n")
        }
    }

    /// Run the whole pipeline for one payload
    pub async fn process(&self, payload: &str) -> ProcessOutcome {
        let Some(identifier) = self.extract_identifier(payload) else {
            self.log.record(
                EventKind::ClientError,
                format!("No identifier in payload: {payload}"),
                SOURCE,
            );
            return ProcessOutcome::NoIdentifier;
        };
        debug!(identifier = %identifier, "Identifier extracted");

        let record = match self.lookup.find_by_identifier(&identifier).await {
            Ok(record) => record,
            Err(e) => {
                let error = CommunicationError::lookup_failed(e.to_string());
                self.log.record(
                    EventKind::ClientError,
                    format!("Lookup for {identifier} failed: {e}"),
                    SOURCE,
                );
                return ProcessOutcome::LookupFailed { identifier, error };
            }
        };

        let reply = self.build_reply(record.as_ref());
        let destination = self.downstream.peer.to_string();
        self.log.record(EventKind::MessageSent, reply.clone(), destination.as_str());

        match self.deliver(&reply).await {
            Ok(ack) => {
                if let Some(ack) = ack {
                    self.log.record(EventKind::ResponseReceived, ack, destination.as_str());
                }
                ProcessOutcome::Delivered { identifier, reply }
            }
            Err(error) => {
                warn!(peer = %destination, error = %error, "Reply delivery failed");
                self.log.record(
                    EventKind::SendError,
                    format!("Delivery of reply for {identifier} failed: {error}"),
                    destination.as_str(),
                );
                ProcessOutcome::DeliveryFailed {
                    identifier,
                    reply,
                    error,
                }
            }
        }
    }

    /// Request/acknowledge round trip over a fresh connection
    pub async fn deliver(&self, reply: &str) -> network::Result<Option<String>> {
        let message = self.wire_message(reply);
        let expected_ack = self.downstream.read_ack.then_some(DOWNSTREAM_ACK);
        send_with_ack(
            &self.downstream.peer,
            message.as_bytes(),
            expected_ack,
            self.downstream.timeout,
        )
        .await
    }
}

#[async_trait]
impl MessageHandler for PayloadProcessor {
    async fn handle(&self, payload: String, source: SocketAddr) -> anyhow::Result<()> {
        let outcome = self.process(&payload).await;
        debug!(peer = %source, outcome = ?outcome, "Payload processed");
        Ok(())
    }
}
