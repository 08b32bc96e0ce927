//! Frame structure

use std::fmt;

use bytes::Bytes;

use crate::method::{self, MethodSignature};
use crate::WireError;

/// Octet that closes every frame
pub const FRAME_END: u8 = 0xCE;

/// Type, channel and length octets before the payload
pub const FRAME_HEADER_SIZE: usize = 7;

/// Header plus terminator: the bytes a frame adds around its payload
pub const FRAME_OVERHEAD: usize = FRAME_HEADER_SIZE + 1;

/// Channel reserved for connection-level methods
pub const CONTROL_CHANNEL: u16 = 0;

/// Frame type octet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Method call or reply
    Method = 1,
    /// Content header: class, weight, body size and properties
    Header = 2,
    /// Slice of a content body
    Body = 3,
    /// Keep-alive
    Heartbeat = 8,
}

impl TryFrom<u8> for FrameType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Method),
            2 => Ok(Self::Header),
            3 => Ok(Self::Body),
            8 => Ok(Self::Heartbeat),
            other => Err(WireError::framing(format!("unknown frame type {}", other))),
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Method => "method",
            Self::Header => "content header",
            Self::Body => "content body",
            Self::Heartbeat => "heartbeat",
        };
        f.write_str(name)
    }
}

/// Protocol frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame type
    pub kind: FrameType,
    /// Channel the frame belongs to
    pub channel: u16,
    /// Frame payload
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame
    pub fn new(kind: FrameType, channel: u16, payload: Bytes) -> Self {
        Self {
            kind,
            channel,
            payload,
        }
    }

    /// Create a method frame from a signature and encoded arguments
    pub fn method(channel: u16, signature: MethodSignature, args: &[u8]) -> Self {
        Self::new(
            FrameType::Method,
            channel,
            method::encode_payload(signature, args),
        )
    }

    /// Create a content header frame from an encoded header payload
    pub fn header(channel: u16, payload: Bytes) -> Self {
        Self::new(FrameType::Header, channel, payload)
    }

    /// Create a content body frame
    pub fn body(channel: u16, payload: Bytes) -> Self {
        Self::new(FrameType::Body, channel, payload)
    }

    /// Create a heartbeat frame
    pub fn heartbeat() -> Self {
        Self::new(FrameType::Heartbeat, CONTROL_CHANNEL, Bytes::new())
    }

    /// Get the payload size
    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }

    /// Size of the frame on the wire
    pub fn wire_size(&self) -> usize {
        self.payload.len() + FRAME_OVERHEAD
    }

    /// Check if this is a method frame
    pub fn is_method(&self) -> bool {
        self.kind == FrameType::Method
    }

    /// Check if this is a heartbeat frame
    pub fn is_heartbeat(&self) -> bool {
        self.kind == FrameType::Heartbeat
    }
}
