//! TCP Connection Helpers
//!
//! Short-lived and long-lived text/binary connections to the workstation's
//! devices. Every operation is bounded by a timeout so a silent peer can never
//! block a caller indefinitely.

use crate::framing::decode_lossy;
use crate::{CommunicationError, Result};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Size of a single read when collecting a text reply
pub const REPLY_CHUNK_SIZE: usize = 1024;

/// Host/port pair of a remote device
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    pub host: String,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// TCP connection wrapper with traffic counters
pub struct TcpConnection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    connected_at: Instant,
    bytes_sent: u64,
    bytes_received: u64,
}

impl TcpConnection {
    pub fn from_stream(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            warn!(peer = %peer_addr, "Failed to set TCP_NODELAY: {}", e);
        }
        Self {
            stream,
            peer_addr,
            connected_at: Instant::now(),
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    /// Connect with timeout
    pub async fn connect(peer: &PeerAddress, timeout: Duration) -> Result<Self> {
        debug!(peer = %peer, "Connecting");

        let stream = tokio::time::timeout(timeout, TcpStream::connect((peer.host.as_str(), peer.port)))
            .await
            .map_err(|_| CommunicationError::timeout(format!("connect to {peer}"), timeout))?
            .map_err(|e| CommunicationError::io(&format!("connect to {peer}"), e))?;

        let peer_addr = stream
            .peer_addr()
            .map_err(|e| CommunicationError::io("peer address", e))?;

        debug!(peer = %peer_addr, "Connected");
        Ok(Self::from_stream(stream, peer_addr))
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Write the whole buffer and flush
    pub async fn send(&mut self, data: &[u8], timeout: Duration) -> Result<()> {
        let peer = self.peer_addr;
        let write = async {
            self.stream.write_all(data).await?;
            self.stream.flush().await
        };
        tokio::time::timeout(timeout, write)
            .await
            .map_err(|_| CommunicationError::timeout(format!("send to {peer}"), timeout))?
            .map_err(|e| CommunicationError::io("send", e))?;

        self.bytes_sent += data.len() as u64;
        debug!(
            peer = %self.peer_addr,
            bytes = data.len(),
            total_sent = self.bytes_sent,
            "Sent"
        );
        Ok(())
    }

    /// One read into `buf`; `Ok(0)` means the peer closed the connection
    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self
            .stream
            .read(buf)
            .await
            .map_err(|e| CommunicationError::io("read", e))?;
        self.bytes_received += n as u64;
        Ok(n)
    }

    /// [`read_chunk`](Self::read_chunk) bounded by `timeout`
    pub async fn read_chunk_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let peer = self.peer_addr;
        tokio::time::timeout(timeout, self.read_chunk(buf))
            .await
            .map_err(|_| CommunicationError::timeout(format!("read from {peer}"), timeout))?
    }

    /// Collect text until `complete` returns true, the peer closes, or the
    /// deadline passes.
    ///
    /// Hitting the deadline with some text collected returns that text; with
    /// nothing collected it is a timeout. Closing without sending anything is
    /// [`CommunicationError::ConnectionClosed`].
    pub async fn read_text_until<P>(&mut self, complete: P, timeout: Duration) -> Result<String>
    where
        P: Fn(&str) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut raw = Vec::new();
        let mut buf = [0u8; REPLY_CHUNK_SIZE];

        loop {
            let read = tokio::time::timeout_at(deadline, self.read_chunk(&mut buf)).await;
            match read {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    raw.extend_from_slice(&buf[..n]);
                    if complete(&decode_lossy(&raw)) {
                        break;
                    }
                }
                Ok(Err(e)) => return Err(e),
                Err(_) if raw.is_empty() => {
                    return Err(CommunicationError::timeout(
                        format!("reply from {}", self.peer_addr),
                        timeout,
                    ))
                }
                Err(_) => {
                    debug!(peer = %self.peer_addr, bytes = raw.len(), "Reply deadline reached, using partial reply");
                    break;
                }
            }
        }

        if raw.is_empty() {
            return Err(CommunicationError::connection_closed(format!(
                "{} closed without replying",
                self.peer_addr
            )));
        }
        Ok(decode_lossy(&raw))
    }

    pub async fn shutdown(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!(peer = %self.peer_addr, "Error shutting down TCP connection: {}", e);
        }
        debug!(
            peer = %self.peer_addr,
            sent = self.bytes_sent,
            received = self.bytes_received,
            open_ms = self.connected_at.elapsed().as_millis() as u64,
            "Closed"
        );
    }
}

/// Send `payload` over a fresh connection and optionally wait for `expected_ack`.
///
/// Returns the acknowledgement text that was read (`None` when no
/// acknowledgement was requested). A reply that differs from the expected
/// token after trimming is [`CommunicationError::AcknowledgementMismatch`].
pub async fn send_with_ack(
    peer: &PeerAddress,
    payload: &[u8],
    expected_ack: Option<&str>,
    timeout: Duration,
) -> Result<Option<String>> {
    let mut conn = TcpConnection::connect(peer, timeout).await?;
    let outcome = exchange(&mut conn, payload, expected_ack, timeout).await;
    conn.shutdown().await;

    if let Ok(Some(ack)) = &outcome {
        info!(peer = %peer, ack = %ack, "Acknowledged");
    }
    outcome
}

async fn exchange(
    conn: &mut TcpConnection,
    payload: &[u8],
    expected_ack: Option<&str>,
    timeout: Duration,
) -> Result<Option<String>> {
    conn.send(payload, timeout).await?;
    let Some(expected) = expected_ack else {
        return Ok(None);
    };

    let mut buf = [0u8; REPLY_CHUNK_SIZE];
    let n = conn.read_chunk_timeout(&mut buf, timeout).await?;
    if n == 0 {
        return Err(CommunicationError::connection_closed(format!(
            "{} closed before acknowledging",
            conn.peer_addr()
        )));
    }

    let reply = decode_lossy(&buf[..n]).trim().to_string();
    if reply != expected {
        return Err(CommunicationError::acknowledgement_mismatch(expected, reply));
    }
    Ok(Some(reply))
}
