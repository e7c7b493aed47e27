//! Terra wire format: framing for the client ↔ controller RPC channel.
//!
//! Every message is a fixed 16-byte `FrameHeader` followed by a JSON payload.
//! The header is what the transport routes on: `kind` says how to interpret
//! the payload and `request_id` pairs a reply with its request on a shared
//! connection. Payload shapes live in `flow.rs`.
//!
//! Header integers are network byte order. There is no unsafe code here; the
//! header is read and written through zerocopy.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use static_assertions::assert_eq_size;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use zerocopy::byteorder::{NetworkEndian, U32, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

// ── Frame Header ─────────────────────────────────────────────────────────────

/// Precedes every payload on the wire.
///
/// Wire size: 16 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct FrameHeader {
    /// Wire format version. Currently 0x01.
    pub version: u8,

    /// `MessageKind` discriminator.
    pub kind: u8,

    /// Reserved, must be zero.
    pub flags: u8,

    /// Reserved, must be zero.
    pub reserved: u8,

    /// Payload length in bytes, not including this header.
    pub length: U32<NetworkEndian>,

    /// Caller-chosen id. Replies, errors and cancels carry the id of the
    /// request they refer to.
    pub request_id: U64<NetworkEndian>,
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(FrameHeader, [u8; 16]);

impl FrameHeader {
    /// Check version and reserved bits, and return the decoded kind.
    pub fn validate(&self) -> Result<MessageKind, WireError> {
        if self.version != FRAME_VERSION {
            return Err(WireError::UnknownVersion(self.version));
        }
        if self.flags != 0 {
            return Err(WireError::ReservedFlagsSet(self.flags));
        }
        let length = self.length.get() as usize;
        if length > MAX_PAYLOAD {
            return Err(WireError::PayloadTooLarge(length));
        }
        MessageKind::try_from(self.kind)
    }
}

// ── Message kinds ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    /// Connectivity smoke test. Payload: `HelloRequest`.
    HelloRequest = 0x01,
    /// Payload: `HelloReply`.
    HelloReply = 0x02,
    /// Shuffle batch submission. Payload: `FlowBatch`.
    SubmitShuffleInfo = 0x03,
    /// Payload: `SubmissionReply`.
    ShuffleInfoReply = 0x04,
    /// Best-effort cancel of an in-flight request. Empty payload.
    Cancel = 0x05,
    /// Server-side failure for a request. Payload: `ErrorReply`.
    Error = 0x06,
}

impl TryFrom<u8> for MessageKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, WireError> {
        match value {
            0x01 => Ok(MessageKind::HelloRequest),
            0x02 => Ok(MessageKind::HelloReply),
            0x03 => Ok(MessageKind::SubmitShuffleInfo),
            0x04 => Ok(MessageKind::ShuffleInfoReply),
            0x05 => Ok(MessageKind::Cancel),
            0x06 => Ok(MessageKind::Error),
            other => Err(WireError::UnknownKind(other)),
        }
    }
}

impl From<MessageKind> for u8 {
    fn from(k: MessageKind) -> u8 {
        k as u8
    }
}

// ── Error replies ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The request payload could not be decoded.
    BadRequest,
    /// The request kind is not served by this endpoint.
    Unimplemented,
    /// The handler failed.
    Internal,
}

/// Payload of an `Error` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub code: ErrorCode,
    pub message: String,
}

// ── Frames ────────────────────────────────────────────────────────────────────

/// A decoded header plus its raw payload.
#[derive(Debug, Clone)]
pub struct Frame {
    pub kind: MessageKind,
    pub request_id: u64,
    pub payload: Bytes,
}

impl Frame {
    /// JSON-encode `body` into a frame. Fails if the payload exceeds `MAX_PAYLOAD`.
    pub fn encode<T: Serialize>(
        kind: MessageKind,
        request_id: u64,
        body: &T,
    ) -> Result<Self, WireError> {
        let raw = serde_json::to_vec(body).map_err(|e| WireError::Encode(e.to_string()))?;
        if raw.len() > MAX_PAYLOAD {
            return Err(WireError::PayloadTooLarge(raw.len()));
        }
        Ok(Self {
            kind,
            request_id,
            payload: Bytes::from(raw),
        })
    }

    /// A frame with no payload, used for `Cancel`.
    pub fn empty(kind: MessageKind, request_id: u64) -> Self {
        Self {
            kind,
            request_id,
            payload: Bytes::new(),
        }
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, WireError> {
        serde_json::from_slice(&self.payload).map_err(|e| WireError::Decode(e.to_string()))
    }

    pub fn header(&self) -> FrameHeader {
        FrameHeader {
            version: FRAME_VERSION,
            kind: self.kind.into(),
            flags: 0,
            reserved: 0,
            length: U32::new(self.payload.len() as u32),
            request_id: U64::new(self.request_id),
        }
    }
}

/// Read one frame. Returns `Ok(None)` on a clean EOF at a frame boundary.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut head = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        match reader.read(&mut head[filled..]).await? {
            0 if filled == 0 => return Ok(None),
            0 => return Err(WireError::Truncated),
            n => filled += n,
        }
    }

    // The buffer is exactly HEADER_LEN bytes, so this cannot fail.
    let header = FrameHeader::read_from(&head[..]).ok_or(WireError::Truncated)?;
    let kind = header.validate()?;

    let mut payload = vec![0u8; header.length.get() as usize];
    reader.read_exact(&mut payload).await?;

    Ok(Some(Frame {
        kind,
        request_id: header.request_id.get(),
        payload: Bytes::from(payload),
    }))
}

/// Write one frame and flush.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame.header().as_bytes()).await?;
    writer.write_all(&frame.payload).await?;
    writer.flush().await?;
    Ok(())
}

// ── Constants ─────────────────────────────────────────────────────────────────

/// Current frame format version.
pub const FRAME_VERSION: u8 = 0x01;

pub const HEADER_LEN: usize = std::mem::size_of::<FrameHeader>();

/// Maximum payload size in bytes (16 MiB).
pub const MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Port the controller listens on unless configured otherwise.
pub const DEFAULT_CONTROLLER_PORT: u16 = 50051;

/// Grace period for in-flight calls when a channel is closed.
pub const SHUTDOWN_GRACE_SECS: u64 = 5;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("unknown message kind: 0x{0:02x}")]
    UnknownKind(u8),

    #[error("unknown frame version: 0x{0:02x}")]
    UnknownVersion(u8),

    #[error("payload length {0} exceeds maximum {}", MAX_PAYLOAD)]
    PayloadTooLarge(usize),

    #[error("reserved flags are non-zero: 0x{0:02x}")]
    ReservedFlagsSet(u8),

    #[error("truncated frame header")]
    Truncated,

    #[error("failed to encode payload: {0}")]
    Encode(String),

    #[error("failed to decode payload: {0}")]
    Decode(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
