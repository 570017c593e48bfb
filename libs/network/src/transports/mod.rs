//! Device Transports
//!
//! TCP building blocks for every device link of the workstation:
//! - [`tcp`]: bounded connect/send/read helpers and the request/acknowledge exchange
//! - [`stream_client`]: long-lived outbound text stream with reconnect backoff
//! - [`listener`]: inbound server dispatching one payload per connection

pub mod listener;
pub mod stream_client;
pub mod tcp;

pub use listener::{ListenerConfig, ListenerServer, ACK_TOKEN};
pub use stream_client::{ConnectionState, ResilientStreamClient, StreamClientConfig};
pub use tcp::{send_with_ack, PeerAddress, TcpConnection};
