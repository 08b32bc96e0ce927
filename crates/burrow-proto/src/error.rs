//! Error types for wire-level operations

use thiserror::Error;

/// Wire-level errors raised while encoding, decoding or framing
#[derive(Debug, Error)]
pub enum WireError {
    /// A value cannot be represented on the wire
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// A read ran past the end of the buffer
    #[error("Truncated input: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes the read required
        needed: usize,
        /// Bytes left in the buffer
        available: usize,
    },

    /// Malformed frame envelope or a stream that ended mid-frame
    #[error("Framing error: {0}")]
    Framing(String),

    /// Frame payload exceeds the negotiated maximum
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Actual payload size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// I/O failure on the underlying stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WireError {
    /// Shorthand for an encoding error
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    /// Shorthand for a framing error
    pub fn framing(msg: impl Into<String>) -> Self {
        Self::Framing(msg.into())
    }

    /// Whether the error leaves the stream unusable
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Framing(_) | Self::FrameTooLarge { .. } | Self::Io(_))
    }
}
