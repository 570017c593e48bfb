//! # Listener Service
//!
//! ## Purpose
//!
//! Turns inbound payloads into product replies for the cobot:
//!
//! ```text
//! scanner / upstream stream ─► ListenerServer ─► PayloadProcessor ─► cobot
//!                                                      │
//!                                                ProductLookup
//! ```
//!
//! [`wiring::Station`] assembles the pieces from a
//! [`station_config::StationConfig`]; the `station` binary drives it.

pub mod catalog;
pub mod processor;
pub mod wiring;

pub use catalog::{InMemoryCatalog, LookupError, ProductLookup};
pub use processor::{
    DownstreamConfig, PayloadProcessor, ProcessOutcome, DEFAULT_IDENTIFIER_PATTERN,
    DOWNSTREAM_ACK,
};
pub use wiring::{listener_config, load_catalog, stream_client_config, Station};
