//! # Device Network Layer
//!
//! ## Purpose
//!
//! Resilient TCP plumbing between the workstation and its devices: the
//! inbound listener, the long-lived upstream text stream, short-lived
//! request/acknowledge exchanges, and the shared activity log that records
//! what each of them did.
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types ─► libs/codec ─► [network] ─► services/adapters (RTDE, vision)
//!                                 │
//!                                 └──────► services/listener (payload pipeline)
//! ```
//!
//! ## Failure Model
//!
//! Every error is a [`CommunicationError`]. One-shot operations surface it to
//! the caller; the long-running loops ([`ResilientStreamClient`],
//! [`ListenerServer`]) log it, record an activity event and carry on.

pub mod activity;
pub mod backoff;
pub mod error;
pub mod framing;
pub mod handler;
pub mod transports;

pub use activity::{ActivityLog, ActivityObserver, ChannelObserver, DEFAULT_LOG_CAPACITY};
pub use backoff::ReconnectBackoff;
pub use error::{CommunicationError, Result};
pub use framing::{decode_lossy, split, LineSplitter, END_MARKER};
pub use handler::{dispatch, handler_fn, MessageHandler};
pub use transports::{
    send_with_ack, ConnectionState, ListenerConfig, ListenerServer, PeerAddress,
    ResilientStreamClient, StreamClientConfig, TcpConnection, ACK_TOKEN,
};
