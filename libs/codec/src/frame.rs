//! # RTDE Frame Codec
//!
//! Length-prefixed framing shared by every RTDE message:
//!
//! ```text
//! ┌──────────────────┬──────────┬─────────────────────────┐
//! │ length (u16, BE) │ type (u8)│ payload (length-3 bytes)│
//! └──────────────────┴──────────┴─────────────────────────┘
//! ```
//!
//! `length` counts the 3 header bytes, so an empty frame has `length == 3` and
//! anything smaller is malformed. Encoding and header decoding are pure; the
//! async helpers at the bottom drive them against a tokio stream with a
//! deadline.

use crate::error::{ProtocolError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Size of the `length + type` header
pub const HEADER_SIZE: usize = 3;

/// Largest payload the 16-bit length field can describe
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize - HEADER_SIZE;

/// Bytes shown by [`hexdump`] in log lines
pub const HEXDUMP_LIMIT: usize = 64;

/// Known RTDE frame types
///
/// `'P'` (0x50) doubles as the legacy protocol-version reply; the client
/// decides from context which one it is reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum FrameType {
    RequestProtocolVersion = 0x56,
    ControlPackageSetupOutputs = 0x4F,
    ControlPackageStart = 0x53,
    ControlPackagePause = 0x50,
    DataPackage = 0x55,
    TextMessage = 0x4D,
    LegacyTextMessage = 0x62,
}

impl FrameType {
    pub const fn name(self) -> &'static str {
        match self {
            FrameType::RequestProtocolVersion => "REQUEST_PROTOCOL_VERSION",
            FrameType::ControlPackageSetupOutputs => "CONTROL_PACKAGE_SETUP_OUTPUTS",
            FrameType::ControlPackageStart => "CONTROL_PACKAGE_START",
            FrameType::ControlPackagePause => "CONTROL_PACKAGE_PAUSE",
            FrameType::DataPackage => "DATA_PACKAGE",
            FrameType::TextMessage => "TEXT_MESSAGE",
            FrameType::LegacyTextMessage => "TEXT_MESSAGE",
        }
    }

    /// Diagnostic frames carry free text and are never part of a handshake
    pub const fn is_text(self) -> bool {
        matches!(self, FrameType::TextMessage | FrameType::LegacyTextMessage)
    }
}

/// Registry name for a raw type byte, `"UNKNOWN"` if unregistered
pub fn type_name(frame_type: u8) -> &'static str {
    FrameType::try_from(frame_type)
        .map(FrameType::name)
        .unwrap_or("UNKNOWN")
}

/// Uppercase hex of the first `max_len` bytes, space separated
pub fn hexdump(bytes: &[u8], max_len: usize) -> String {
    bytes
        .iter()
        .take(max_len)
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// One decoded frame
///
/// The type is kept as the raw byte so unknown types survive decoding and can
/// be reported verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: u8,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(frame_type: impl Into<u8>, payload: impl Into<Bytes>) -> Self {
        Self {
            frame_type: frame_type.into(),
            payload: payload.into(),
        }
    }

    pub fn empty(frame_type: impl Into<u8>) -> Self {
        Self::new(frame_type, Bytes::new())
    }

    pub fn kind(&self) -> Option<FrameType> {
        FrameType::try_from(self.frame_type).ok()
    }

    pub fn is(&self, frame_type: FrameType) -> bool {
        self.frame_type == u8::from(frame_type)
    }

    pub fn is_text(&self) -> bool {
        self.kind().map(FrameType::is_text).unwrap_or(false)
    }

    /// Value of the length field on the wire
    pub fn length(&self) -> usize {
        self.payload.len() + HEADER_SIZE
    }

    /// Payload decoded as UTF-8, invalid sequences replaced, whitespace trimmed
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).trim().to_string()
    }

    pub fn encode(&self) -> Result<Bytes> {
        encode_frame(self.frame_type, &self.payload)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let printable = if (32..=126).contains(&self.frame_type) {
            self.frame_type as char
        } else {
            '?'
        };
        write!(
            f,
            "type=0x{:02X}('{}','{}'), len={}, payload_hex={}",
            self.frame_type,
            printable,
            type_name(self.frame_type),
            self.payload.len(),
            hexdump(&self.payload, HEXDUMP_LIMIT)
        )
    }
}

/// Encode `u16(len+3) || type || payload`
pub fn encode_frame(frame_type: u8, payload: &[u8]) -> Result<Bytes> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge {
            size: payload.len(),
            limit: MAX_PAYLOAD_SIZE,
        });
    }

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_u16((payload.len() + HEADER_SIZE) as u16);
    buf.put_u8(frame_type);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Split a header into `(length, type)`, rejecting `length < 3`
pub fn decode_header(header: &[u8; HEADER_SIZE]) -> Result<(u16, u8)> {
    let length = u16::from_be_bytes([header[0], header[1]]);
    if (length as usize) < HEADER_SIZE {
        return Err(ProtocolError::malformed(
            length,
            format!("length field smaller than the {HEADER_SIZE}-byte header"),
        ));
    }
    Ok((length, header[2]))
}

/// Decode one frame from the front of `buf`, returning it and the bytes consumed
pub fn decode_frame(buf: &[u8]) -> Result<(Frame, usize)> {
    if buf.len() < HEADER_SIZE {
        return Err(ProtocolError::message_too_small(
            HEADER_SIZE,
            buf.len(),
            "frame header",
        ));
    }
    let (length, frame_type) = decode_header(&[buf[0], buf[1], buf[2]])?;
    let length = length as usize;
    if buf.len() < length {
        return Err(ProtocolError::message_too_small(
            length,
            buf.len(),
            "frame payload",
        ));
    }

    let payload = Bytes::copy_from_slice(&buf[HEADER_SIZE..length]);
    Ok((Frame::new(frame_type, payload), length))
}

/// Read exactly one frame, failing if the whole frame does not arrive in time
pub async fn read_frame<R>(reader: &mut R, timeout: Duration) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    match tokio::time::timeout(timeout, read_frame_unbounded(reader, timeout)).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::timeout(timeout, "reading frame")),
    }
}

async fn read_frame_unbounded<R>(reader: &mut R, timeout: Duration) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    reader
        .read_exact(&mut header)
        .await
        .map_err(|e| ProtocolError::from_io(e, "frame header", timeout))?;
    let (length, frame_type) = decode_header(&header)?;

    let mut payload = vec![0u8; length as usize - HEADER_SIZE];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| ProtocolError::from_io(e, "frame payload", timeout))?;

    let frame = Frame::new(frame_type, payload);
    debug!(frame = %frame, "recv");
    Ok(frame)
}

/// Encode and write one frame, flushing before returning
pub async fn write_frame<W>(
    writer: &mut W,
    frame_type: u8,
    payload: &[u8],
    timeout: Duration,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let encoded = encode_frame(frame_type, payload)?;
    let write = async {
        writer.write_all(&encoded).await?;
        writer.flush().await
    };

    match tokio::time::timeout(timeout, write).await {
        Ok(Ok(())) => {
            debug!(frame = %Frame::new(frame_type, Bytes::copy_from_slice(payload)), "send");
            Ok(())
        }
        Ok(Err(e)) => Err(ProtocolError::from_io(e, "frame write", timeout)),
        Err(_) => Err(ProtocolError::timeout(timeout, "writing frame")),
    }
}
