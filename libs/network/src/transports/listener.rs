//! # Listener Server
//!
//! ## Purpose
//!
//! Inbound TCP endpoint for the vision/automation peer. Each accepted
//! connection carries one text payload which is handed to a
//! [`MessageHandler`] and acknowledged with [`ACK_TOKEN`].
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────── ListenerServer ────────────────┐
//! peer ──accept──►│ accept loop ──spawn──► connection task          │
//!                 │  (select on token)       read once → handler    │
//!                 │                          → "MESSAGE_RECEIVED"   │
//!                 │                          → close                │
//! upstream ◄──────│ ResilientStreamClient ──► same handler          │
//!                 │                                                 │
//!                 │ ActivityLog (capped) ──► ActivityObserver       │
//!                 └─────────────────────────────────────────────────┘
//! ```
//!
//! Connections are handled concurrently, bounded by `max_connections`; a
//! connection arriving while the bound is exhausted is closed immediately and
//! reported as a client error. Handler failures never stop the accept loop.

use super::stream_client::{ResilientStreamClient, StreamClientConfig};
use super::tcp::{send_with_ack, PeerAddress, TcpConnection};
use crate::activity::{ActivityLog, ActivityObserver};
use crate::framing::decode_lossy;
use crate::handler::{dispatch, MessageHandler};
use crate::{CommunicationError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use types::EventKind;

/// Acknowledgement exchanged on the listener side in both directions
pub const ACK_TOKEN: &str = "MESSAGE_RECEIVED";

const LISTEN_BACKLOG: u32 = 128;
const ACCEPT_ERROR_PAUSE: Duration = Duration::from_millis(100);
const SOURCE: &str = "listener";

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Concurrent connection bound
    pub max_connections: usize,
    /// Largest payload read from one connection
    pub read_buffer_size: usize,
    /// How long a connection may stay silent before it is dropped
    pub read_timeout: Duration,
    /// Destination of [`ListenerServer::send_message`]
    pub notify_peer: Option<(String, u16)>,
    pub send_timeout: Duration,
    /// Upstream peer streamed into the same handler
    pub upstream: Option<StreamClientConfig>,
    /// How long `stop` waits for the accept loop
    pub join_timeout: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 34000,
            max_connections: 16,
            read_buffer_size: 4096,
            read_timeout: Duration::from_secs(3),
            notify_peer: Some(("127.0.0.1".to_string(), 3401)),
            send_timeout: Duration::from_secs(3),
            upstream: None,
            join_timeout: Duration::from_secs(2),
        }
    }
}

struct RunningListener {
    token: CancellationToken,
    accept_task: JoinHandle<()>,
    local_addr: SocketAddr,
    stream: Option<ResilientStreamClient>,
}

/// TCP listener with bounded concurrent handlers and a shared activity log
pub struct ListenerServer {
    config: ListenerConfig,
    log: Arc<ActivityLog>,
    running: Mutex<Option<RunningListener>>,
}

impl ListenerServer {
    pub fn new(config: ListenerConfig) -> Self {
        Self::with_activity_log(config, Arc::new(ActivityLog::default()))
    }

    /// Share an existing log, e.g. with the payload processor
    pub fn with_activity_log(config: ListenerConfig, log: Arc<ActivityLog>) -> Self {
        Self {
            config,
            log,
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    pub fn activity_log(&self) -> Arc<ActivityLog> {
        self.log.clone()
    }

    /// Bind and start accepting; a second call returns the bound address.
    ///
    /// Failure to bind is the only error surfaced here. Must be called from
    /// within a tokio runtime.
    pub fn start(
        &self,
        handler: Arc<dyn MessageHandler>,
        observer: Option<Arc<dyn ActivityObserver>>,
    ) -> Result<SocketAddr> {
        let mut running = self.running.lock();
        if let Some(existing) = running.as_ref() {
            debug!(addr = %existing.local_addr, "Listener already running");
            return Ok(existing.local_addr);
        }

        self.log.set_observer(observer);
        let listener = match bind_reusable(&self.config.bind_address, self.config.port) {
            Ok(listener) => listener,
            Err(e) => {
                drop(running);
                error!(
                    bind = %self.config.bind_address,
                    port = self.config.port,
                    error = %e,
                    "Failed to bind listener"
                );
                self.log
                    .record(EventKind::ClientError, format!("Bind failed: {e}"), SOURCE);
                return Err(e);
            }
        };
        let local_addr = listener
            .local_addr()
            .map_err(|e| CommunicationError::io("listener address", e))?;

        let token = CancellationToken::new();
        let accept = AcceptLoop {
            listener,
            handler: handler.clone(),
            log: self.log.clone(),
            permits: Arc::new(Semaphore::new(self.config.max_connections.max(1))),
            read_buffer_size: self.config.read_buffer_size.max(1),
            read_timeout: self.config.read_timeout,
            send_timeout: self.config.send_timeout,
            token: token.clone(),
        };
        let accept_task = tokio::spawn(accept.run());

        let stream = self.config.upstream.clone().map(|upstream| {
            let client = ResilientStreamClient::new(upstream).with_activity_log(self.log.clone());
            client.start(handler);
            client
        });

        *running = Some(RunningListener {
            token,
            accept_task,
            local_addr,
            stream,
        });
        drop(running);

        self.log.record(
            EventKind::ListenerStarted,
            format!("Listening on {local_addr}"),
            SOURCE,
        );
        Ok(local_addr)
    }

    /// Stop accepting, stop the upstream client, and wait for the accept loop.
    ///
    /// The activity log is left intact. Idempotent.
    pub async fn stop(&self) {
        let Some(RunningListener {
            token,
            mut accept_task,
            local_addr,
            stream,
        }) = self.running.lock().take()
        else {
            return;
        };

        token.cancel();
        if let Some(stream) = stream {
            stream.stop().await;
        }
        if tokio::time::timeout(self.config.join_timeout, &mut accept_task)
            .await
            .is_err()
        {
            warn!(addr = %local_addr, "Accept loop did not stop in time, aborting");
            accept_task.abort();
        }

        self.log.record(
            EventKind::ListenerStopped,
            format!("Stopped listening on {local_addr}"),
            SOURCE,
        );
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|r| r.local_addr)
    }

    /// Whether the upstream stream client currently holds a connection
    pub fn stream_connected(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .and_then(|r| r.stream.as_ref())
            .is_some_and(ResilientStreamClient::is_connected)
    }

    /// Send `text` to the notification peer and wait for [`ACK_TOKEN`]
    pub async fn send_message(&self, text: &str) -> bool {
        let Some((host, port)) = self.config.notify_peer.clone() else {
            self.log.record(
                EventKind::SendError,
                "No notification peer configured",
                SOURCE,
            );
            return false;
        };
        let peer = PeerAddress::new(host, port);
        let destination = peer.to_string();

        self.log
            .record(EventKind::MessageSent, text.to_string(), destination.as_str());
        match send_with_ack(&peer, text.as_bytes(), Some(ACK_TOKEN), self.config.send_timeout).await {
            Ok(_) => {
                self.log
                    .record(EventKind::ResponseReceived, ACK_TOKEN, destination.as_str());
                true
            }
            Err(e) => {
                self.log
                    .record(EventKind::SendError, e.to_string(), destination.as_str());
                false
            }
        }
    }
}

/// Bind with `SO_REUSEADDR` so a restart does not trip over TIME_WAIT sockets
fn bind_reusable(bind_address: &str, port: u16) -> Result<TcpListener> {
    let addr: SocketAddr = format!("{bind_address}:{port}").parse().map_err(|_| {
        CommunicationError::configuration(
            format!("invalid listener address {bind_address}:{port}"),
            Some("bind_address"),
        )
    })?;

    let socket = if addr.is_ipv6() {
        TcpSocket::new_v6()
    } else {
        TcpSocket::new_v4()
    }
    .map_err(|e| CommunicationError::io("create listener socket", e))?;
    socket
        .set_reuseaddr(true)
        .map_err(|e| CommunicationError::io("set SO_REUSEADDR", e))?;
    socket
        .bind(addr)
        .map_err(|e| CommunicationError::io(&format!("bind {addr}"), e))?;
    socket
        .listen(LISTEN_BACKLOG)
        .map_err(|e| CommunicationError::io(&format!("listen on {addr}"), e))
}

/// State owned by the spawned accept loop
struct AcceptLoop {
    listener: TcpListener,
    handler: Arc<dyn MessageHandler>,
    log: Arc<ActivityLog>,
    permits: Arc<Semaphore>,
    read_buffer_size: usize,
    read_timeout: Duration,
    send_timeout: Duration,
    token: CancellationToken,
}

impl AcceptLoop {
    async fn run(self) {
        loop {
            let accepted = tokio::select! {
                _ = self.token.cancelled() => break,
                result = self.listener.accept() => result,
            };

            match accepted {
                Ok((stream, peer)) => self.admit(stream, peer),
                Err(e) => {
                    self.log
                        .record(EventKind::ClientError, format!("Accept failed: {e}"), SOURCE);
                    tokio::select! {
                        _ = self.token.cancelled() => break,
                        _ = tokio::time::sleep(ACCEPT_ERROR_PAUSE) => {}
                    }
                }
            }
        }
        debug!("Accept loop exited");
    }

    fn admit(&self, stream: TcpStream, peer: SocketAddr) {
        let Ok(permit) = self.permits.clone().try_acquire_owned() else {
            self.log.record(
                EventKind::ClientError,
                "Connection limit reached, rejecting",
                peer.to_string(),
            );
            drop(stream);
            return;
        };

        self.log
            .record(EventKind::ClientConnected, "Connection accepted", peer.to_string());
        let connection = ConnectionTask {
            conn: TcpConnection::from_stream(stream, peer),
            handler: self.handler.clone(),
            log: self.log.clone(),
            read_buffer_size: self.read_buffer_size,
            read_timeout: self.read_timeout,
            send_timeout: self.send_timeout,
            token: self.token.child_token(),
        };
        tokio::spawn(async move {
            let _permit = permit;
            connection.run().await;
        });
    }
}

/// One accepted connection: read once, dispatch, acknowledge, close
struct ConnectionTask {
    conn: TcpConnection,
    handler: Arc<dyn MessageHandler>,
    log: Arc<ActivityLog>,
    read_buffer_size: usize,
    read_timeout: Duration,
    send_timeout: Duration,
    token: CancellationToken,
}

impl ConnectionTask {
    async fn run(mut self) {
        let peer = self.conn.peer_addr();
        let source = peer.to_string();
        let mut buf = vec![0u8; self.read_buffer_size];

        let read = tokio::select! {
            _ = self.token.cancelled() => None,
            result = self.conn.read_chunk_timeout(&mut buf, self.read_timeout) => Some(result),
        };
        let Some(read) = read else {
            self.conn.shutdown().await;
            return;
        };

        match read {
            Ok(0) => debug!(peer = %peer, "Connection closed without data"),
            Ok(n) => {
                let payload = decode_lossy(&buf[..n]).trim().to_string();
                if payload.is_empty() {
                    debug!(peer = %peer, "Ignoring blank payload");
                } else {
                    self.log
                        .record(EventKind::MessageReceived, payload.clone(), source.as_str());
                    if let Err(e) = dispatch(self.handler.as_ref(), payload, peer).await {
                        self.log.record(
                            EventKind::ClientError,
                            format!("Handler failed: {e}"),
                            source.as_str(),
                        );
                    }
                    match self.conn.send(ACK_TOKEN.as_bytes(), self.send_timeout).await {
                        Ok(()) => {
                            self.log
                                .record(EventKind::ResponseSent, ACK_TOKEN, source.as_str());
                        }
                        Err(e) => {
                            self.log.record(
                                EventKind::SendError,
                                format!("Acknowledgement failed: {e}"),
                                source.as_str(),
                            );
                        }
                    }
                }
            }
            Err(e) => {
                self.log
                    .record(EventKind::ClientError, format!("Read failed: {e}"), source.as_str());
            }
        }

        self.conn.shutdown().await;
        info!(peer = %peer, "Connection closed");
    }
}
