//! Text-interface pose fallback
//!
//! The controller's script port answers `get_actual_tcp_pose()` with a plain
//! text list. No framing, no handshake: send the query, collect text until a
//! closing bracket shows up, then pick six numbers out of it.

use network::{CommunicationError, PeerAddress, Result, TcpConnection};
use once_cell::sync::Lazy;
use regex::Regex;
use station_config::RtdeSettings;
use std::time::Duration;
use tracing::{debug, info};
use types::Pose;

/// Script interface port of the controller
pub const SCRIPT_PORT: u16 = 30002;

/// Query sent to the script interface
pub const POSE_QUERY: &str = "get_actual_tcp_pose()\n";

/// How long a reply may take to reach its closing bracket
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(3);

/// Reply words marking a controller fault instead of a pose
const FAULT_WORDS: [&str; 3] = ["error", "protective", "safety"];

static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"p?\[([^\]]+)\]").expect("static regex"));

static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d+\.?\d*(?:[eE][+-]?\d+)?").expect("static regex"));

/// Client for the controller's script text port
#[derive(Debug, Clone)]
pub struct TextInterfaceClient {
    peer: PeerAddress,
    timeout: Duration,
}

impl TextInterfaceClient {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            peer: PeerAddress::new(host, port),
            timeout,
        }
    }

    pub fn from_settings(settings: &RtdeSettings) -> Self {
        Self::new(settings.host.clone(), settings.fallback_port, settings.timeout())
    }

    pub fn peer(&self) -> &PeerAddress {
        &self.peer
    }

    /// Query the pose; meters/radians like the RTDE path
    pub async fn read_pose(&self) -> Result<Pose> {
        let mut conn = TcpConnection::connect(&self.peer, self.timeout).await?;
        let reply = query(&mut conn, self.timeout).await;
        conn.shutdown().await;

        let reply = reply?;
        debug!(peer = %self.peer, reply = %reply, "Script interface reply");
        let pose = parse_pose_reply(&reply)?;
        info!(peer = %self.peer, pose = %pose, "Pose read over script interface");
        Ok(pose)
    }
}

async fn query(conn: &mut TcpConnection, timeout: Duration) -> Result<String> {
    conn.send(POSE_QUERY.as_bytes(), timeout).await?;
    conn.read_text_until(
        |text| text.contains('[') && text.contains(']'),
        REPLY_TIMEOUT.min(timeout),
    )
    .await
}

/// Extract `(x, y, z, rx, ry, rz)` from a script-interface reply.
///
/// A bracketed list (`[..]` or `p[..]`) wins; otherwise the first six numeric
/// tokens anywhere in the text are used. Fault replies and out-of-range poses
/// are rejected.
pub fn parse_pose_reply(reply: &str) -> Result<Pose> {
    let lowered = reply.to_lowercase();
    if let Some(word) = FAULT_WORDS.iter().find(|w| lowered.contains(*w)) {
        return Err(CommunicationError::unparsable(
            format!("controller reported '{word}'"),
            truncate(reply),
        ));
    }

    let values = bracketed_values(reply).unwrap_or_else(|| numeric_tokens(reply));
    if values.len() < 6 {
        return Err(CommunicationError::unparsable(
            format!("found {} numeric values, need 6", values.len()),
            truncate(reply),
        ));
    }

    let pose = Pose::from_array([
        values[0], values[1], values[2], values[3], values[4], values[5],
    ]);
    if !pose.is_plausible() {
        return Err(CommunicationError::unparsable(
            format!("pose out of range ({})", pose.to_millimeters_degrees()),
            truncate(reply),
        ));
    }
    Ok(pose)
}

/// All list entries, or `None` when there is no list or an entry is not a number
fn bracketed_values(reply: &str) -> Option<Vec<f64>> {
    let inner = BRACKETED.captures(reply)?.get(1)?.as_str();
    inner
        .split(',')
        .map(|v| v.trim().parse::<f64>().ok())
        .collect()
}

fn numeric_tokens(reply: &str) -> Vec<f64> {
    NUMBER
        .find_iter(reply)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .take(6)
        .collect()
}

fn truncate(reply: &str) -> String {
    reply.trim().chars().take(100).collect()
}
