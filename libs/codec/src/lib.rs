//! # Workstation Protocol Codec
//!
//! ## Purpose
//!
//! The "rules" layer for the robot's binary real-time data-exchange (RTDE)
//! protocol:
//! - Length-prefixed frame encoding/decoding
//! - Frame-type registry and diagnostics
//! - Handshake payload builders and reply parsers
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → [codec] → services/adapters
//!     ↑           ↓             ↓
//! Pose       Frame rules    Session state machine
//!            RTDE payloads  Socket ownership
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Connection management or retries (belongs in `network` and the adapters)
//! - Session state such as the negotiated recipe id
//!
//! Reading and writing whole frames against a tokio stream is provided here
//! because a frame read is only meaningful together with its length rules.

pub mod error;
pub mod frame;
pub mod rtde;

pub use error::{ProtocolError, Result};
pub use frame::{
    decode_frame, decode_header, encode_frame, hexdump, read_frame, type_name, write_frame,
    Frame, FrameType, HEADER_SIZE, HEXDUMP_LIMIT, MAX_PAYLOAD_SIZE,
};
pub use rtde::{SetupOutcome, VersionAcceptance};
