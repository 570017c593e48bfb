//! RTDE handshake payloads
//!
//! Pure builders for what the client sends and parsers for what the robot
//! answers. Session sequencing lives in the adapter service; nothing here
//! touches a socket.

use crate::error::{ProtocolError, Result};
use crate::frame::{FrameType, HEADER_SIZE};
use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use types::Pose;

/// Default RTDE port on the controller
pub const RTDE_PORT: u16 = 30004;

/// Output variable holding the tool-center-point pose
pub const TCP_POSE_VARIABLE: &str = "actual_TCP_pose";

/// Requested output rate for protocol version 2
pub const DEFAULT_FREQUENCY_HZ: f64 = 125.0;

/// Versions tried during negotiation, most preferred first
pub const CANDIDATE_VERSIONS: [u16; 2] = [2, 1];

/// Recipe byte plus six big-endian doubles
pub const POSE_PAYLOAD_SIZE: usize = 1 + 6 * 8;

/// Marker the controller puts in the type list for an unknown variable
pub const NOT_FOUND_MARKER: &str = "NOT_FOUND";

/// Legacy controllers answer a version request with type `'P'`
pub const LEGACY_VERSION_REPLY: u8 = 0x50;

/// How a protocol-version reply signals acceptance
///
/// Controllers differ: some echo the 2-byte version they accept, others send a
/// single boolean byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionAcceptance {
    /// A 2-byte reply must echo the requested version; a 1-byte reply is a flag
    #[default]
    VersionEcho,
    /// First byte nonzero means accepted
    Flag,
}

impl VersionAcceptance {
    pub fn accepts(self, requested: u16, reply: &[u8]) -> Result<bool> {
        match (self, reply.len()) {
            (_, 0) => Err(ProtocolError::message_too_small(1, 0, "version reply")),
            (VersionAcceptance::VersionEcho, 1) | (VersionAcceptance::Flag, _) => {
                Ok(reply[0] != 0)
            }
            (VersionAcceptance::VersionEcho, _) => Ok(BigEndian::read_u16(reply) == requested),
        }
    }
}

/// Frame types a version reply may arrive as
pub fn is_version_reply(frame_type: u8) -> bool {
    frame_type == u8::from(FrameType::RequestProtocolVersion) || frame_type == LEGACY_VERSION_REPLY
}

pub fn version_request(version: u16) -> [u8; 2] {
    version.to_be_bytes()
}

/// Setup-outputs request body
///
/// Version 2 prefixes the comma-separated variable list with the requested
/// frequency as a big-endian double; version 1 sends the names alone.
pub fn setup_outputs_request(version: u16, frequency_hz: f64, variables: &[&str]) -> Bytes {
    let names = variables.join(",");
    let mut buf = BytesMut::with_capacity(8 + names.len());
    if version >= 2 {
        buf.put_f64(frequency_hz);
    }
    buf.put_slice(names.as_bytes());
    buf.freeze()
}

/// Result of a setup-outputs exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupOutcome {
    Accepted { recipe_id: u8, types: String },
    Rejected { reason: String },
}

/// Interpret a setup-outputs reply: `[recipe_id] + type list`
pub fn parse_setup_reply(payload: &[u8]) -> Result<SetupOutcome> {
    let Some((&recipe_id, rest)) = payload.split_first() else {
        return Err(ProtocolError::message_too_small(1, 0, "setup-outputs reply"));
    };
    let types = String::from_utf8_lossy(rest).trim().to_string();

    if recipe_id == 0 {
        return Ok(SetupOutcome::Rejected {
            reason: "recipe id 0".to_string(),
        });
    }
    if types.contains(NOT_FOUND_MARKER) {
        return Ok(SetupOutcome::Rejected {
            reason: format!("unknown variable in type list '{types}'"),
        });
    }
    Ok(SetupOutcome::Accepted { recipe_id, types })
}

/// `true` when the start reply confirms streaming
pub fn parse_start_reply(payload: &[u8]) -> Result<bool> {
    match payload.first() {
        Some(&flag) => Ok(flag == 1),
        None => Err(ProtocolError::message_too_small(1, 0, "start reply")),
    }
}

/// Split a data package into `(recipe_id, pose)`; the pose is in meters/radians
pub fn parse_pose_data(payload: &[u8]) -> Result<(u8, Pose)> {
    if payload.len() < POSE_PAYLOAD_SIZE {
        return Err(ProtocolError::malformed(
            (payload.len() + HEADER_SIZE) as u16,
            format!(
                "data package carries {} bytes, pose needs {POSE_PAYLOAD_SIZE}",
                payload.len()
            ),
        ));
    }

    let mut values = [0.0f64; 6];
    for (value, chunk) in values
        .iter_mut()
        .zip(payload[1..POSE_PAYLOAD_SIZE].chunks_exact(8))
    {
        *value = BigEndian::read_f64(chunk);
    }
    Ok((payload[0], Pose::from_array(values)))
}

/// Build a data package body, as the controller would send it
pub fn pose_data_payload(recipe_id: u8, pose: &Pose) -> Bytes {
    let mut buf = BytesMut::with_capacity(POSE_PAYLOAD_SIZE);
    buf.put_u8(recipe_id);
    for value in pose.to_array() {
        buf.put_f64(value);
    }
    buf.freeze()
}
