//! # Resilient Stream Client
//!
//! ## Purpose
//!
//! Keeps a long-lived outbound text stream to one fixed peer (the vision
//! controller acting as a data source) and feeds every complete message to a
//! [`MessageHandler`].
//!
//! ## Reconnect Loop
//!
//! ```text
//!      ┌──────────── reset backoff ◄──── connected
//!      ▼                                    │
//!  Connecting ──fail──► sleep(backoff) ──► Reconnecting
//!      │                   ▲   double, capped
//!      └──► read ─► LineSplitter ─► handler(message)
//!            │ EOF / error
//!            └────────────────────┘
//! ```
//!
//! A fresh [`LineSplitter`] per connection guarantees a message cut off by a
//! disconnect is never delivered, and nothing is delivered twice. Messages are
//! dispatched sequentially so delivery order equals arrival order.

use super::tcp::{PeerAddress, TcpConnection};
use crate::activity::ActivityLog;
use crate::backoff::ReconnectBackoff;
use crate::framing::LineSplitter;
use crate::handler::{dispatch, MessageHandler};
use crate::CommunicationError;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use types::EventKind;

/// Connection states of the stream client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not running
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// Connected and reading
    Connected,
    /// Waiting out the backoff after a failure
    Reconnecting,
}

/// Configuration for the stream client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamClientConfig {
    pub host: String,
    pub port: u16,
    /// Timeout of a single connection attempt
    pub connect_timeout: Duration,
    /// Base backoff time for reconnection
    pub base_backoff: Duration,
    /// Maximum backoff time
    pub max_backoff: Duration,
    /// Bytes requested per socket read
    pub read_buffer_size: usize,
    /// How long `stop` waits for the loop before aborting it
    pub join_timeout: Duration,
}

impl Default for StreamClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 34000,
            connect_timeout: Duration::from_secs(5),
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            read_buffer_size: 4096,
            join_timeout: Duration::from_secs(2),
        }
    }
}

impl StreamClientConfig {
    pub fn peer(&self) -> PeerAddress {
        PeerAddress::new(self.host.clone(), self.port)
    }
}

struct RunningLoop {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Outbound text stream with automatic reconnection
pub struct ResilientStreamClient {
    config: StreamClientConfig,
    state: Arc<RwLock<ConnectionState>>,
    log: Option<Arc<ActivityLog>>,
    running: Mutex<Option<RunningLoop>>,
}

impl ResilientStreamClient {
    pub fn new(config: StreamClientConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            log: None,
            running: Mutex::new(None),
        }
    }

    /// Report connection changes and failures to a shared activity log
    pub fn with_activity_log(mut self, log: Arc<ActivityLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn config(&self) -> &StreamClientConfig {
        &self.config
    }

    /// Spawn the reconnect loop; returns `false` if it is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, handler: Arc<dyn MessageHandler>) -> bool {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            debug!(peer = %self.config.peer(), "Stream client already running");
            return false;
        }

        let token = CancellationToken::new();
        let worker = StreamWorker {
            config: self.config.clone(),
            state: self.state.clone(),
            log: self.log.clone(),
            handler,
            token: token.clone(),
        };
        let task = tokio::spawn(worker.run());
        *running = Some(RunningLoop { token, task });
        info!(peer = %self.config.peer(), "Stream client started");
        true
    }

    /// Cancel the loop, closing any open connection, and wait for it to exit.
    ///
    /// Safe to call repeatedly and from any task.
    pub async fn stop(&self) {
        let Some(RunningLoop { token, mut task }) = self.running.lock().take() else {
            return;
        };
        token.cancel();

        if tokio::time::timeout(self.config.join_timeout, &mut task)
            .await
            .is_err()
        {
            warn!(peer = %self.config.peer(), "Stream client did not stop in time, aborting");
            task.abort();
        }
        *self.state.write() = ConnectionState::Disconnected;
        info!(peer = %self.config.peer(), "Stream client stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }
}

/// How one connected session ended
enum SessionEnd {
    Cancelled,
    PeerClosed,
    Failed(CommunicationError),
}

/// State owned by the spawned loop
struct StreamWorker {
    config: StreamClientConfig,
    state: Arc<RwLock<ConnectionState>>,
    log: Option<Arc<ActivityLog>>,
    handler: Arc<dyn MessageHandler>,
    token: CancellationToken,
}

impl StreamWorker {
    async fn run(self) {
        let peer = self.config.peer();
        let source = peer.to_string();
        let mut backoff = ReconnectBackoff::new(self.config.base_backoff, self.config.max_backoff);

        while !self.token.is_cancelled() {
            self.set_state(ConnectionState::Connecting);
            let connected = tokio::select! {
                _ = self.token.cancelled() => break,
                result = TcpConnection::connect(&peer, self.config.connect_timeout) => result,
            };

            match connected {
                Ok(mut conn) => {
                    backoff.reset();
                    self.set_state(ConnectionState::Connected);
                    self.record(EventKind::StreamConnected, "Connected", &source);

                    let end = self.read_session(&mut conn).await;
                    conn.shutdown().await;
                    match end {
                        SessionEnd::Cancelled => break,
                        SessionEnd::PeerClosed => {
                            self.record(EventKind::StreamDisconnected, "Peer closed the connection", &source)
                        }
                        SessionEnd::Failed(err) => {
                            self.record(EventKind::ClientError, format!("Stream read failed: {err}"), &source)
                        }
                    }
                }
                Err(err) => {
                    self.record(
                        EventKind::ClientError,
                        format!("Connect failed: {err}"),
                        &source,
                    );
                }
            }

            self.set_state(ConnectionState::Reconnecting);
            let delay = backoff.next_delay();
            debug!(
                peer = %peer,
                delay_ms = delay.as_millis() as u64,
                attempt = backoff.failures(),
                "Reconnecting after backoff"
            );
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ConnectionState::Disconnected);
        debug!(peer = %peer, "Stream loop exited");
    }

    async fn read_session(&self, conn: &mut TcpConnection) -> SessionEnd {
        let mut splitter = LineSplitter::new();
        let mut buf = vec![0u8; self.config.read_buffer_size.max(1)];
        let peer_addr = conn.peer_addr();
        let source = peer_addr.to_string();

        loop {
            let read = tokio::select! {
                _ = self.token.cancelled() => return SessionEnd::Cancelled,
                result = conn.read_chunk(&mut buf) => result,
            };

            let n = match read {
                Ok(0) => return SessionEnd::PeerClosed,
                Ok(n) => n,
                Err(err) => return SessionEnd::Failed(err),
            };

            for message in splitter.push(&buf[..n]) {
                self.record(EventKind::MessageReceived, message.clone(), &source);
                if let Err(err) = dispatch(self.handler.as_ref(), message, peer_addr).await {
                    self.record(EventKind::ClientError, format!("Handler failed: {err}"), &source);
                }
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    fn record(&self, kind: EventKind, message: impl Into<String>, source: &str) {
        match &self.log {
            Some(log) => {
                log.record(kind, message, source);
            }
            None if kind.is_error() => warn!(source, "{}", message.into()),
            None => info!(source, "{}", message.into()),
        }
    }
}
