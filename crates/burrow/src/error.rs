//! Error types for the Burrow library

use std::fmt;
use std::time::Duration;

use burrow_proto::method::MethodSignature;
use burrow_proto::{Reader, WireError, Writer};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Burrow operations
#[derive(Debug, Error)]
pub enum BurrowError {
    /// Malformed frame envelope or a stream that failed mid-frame
    #[error("Framing error: {0}")]
    Framing(String),

    /// Structurally valid traffic that makes no sense at this point
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A value could not be encoded, or a payload was shorter than its fields
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// A read or a wait ran past its deadline
    #[error("Timed out after {duration:?}")]
    TimedOut {
        /// Duration that was exceeded
        duration: Duration,
    },

    /// A method arrived that the channel has no handler for
    #[error("Unknown method {signature} on channel {channel}")]
    UnknownMethod {
        /// Receiving channel
        channel: u16,
        /// Signature of the method
        signature: MethodSignature,
    },

    /// A channel received traffic it cannot interpret
    #[error("Channel error: {0}")]
    Channel(String),

    /// The connection is closed and cannot be used
    #[error("Connection closed: {0}")]
    ConnectionClosed(CloseReason),

    /// A channel was closed while an operation waited on it
    #[error("Channel {channel} closed: {reason}")]
    ChannelClosed {
        /// Closed channel
        channel: u16,
        /// Close reason
        reason: CloseReason,
    },

    /// The broker asked the client to connect elsewhere
    #[error("Redirected to {host}")]
    Redirected {
        /// Host the broker suggested
        host: String,
        /// Known hosts reported with the redirect
        known_hosts: String,
    },

    /// Every channel id up to the negotiated maximum is taken
    #[error("No free channel ids available")]
    NoFreeChannel,

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BurrowError {
    /// Whether the error leaves the connection unusable
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Framing(_) | Self::Protocol(_) | Self::Io(_) | Self::ConnectionClosed(_)
        )
    }
}

impl From<WireError> for BurrowError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Encoding(msg) => Self::Encoding(msg),
            err @ WireError::Truncated { .. } => Self::Encoding(err.to_string()),
            WireError::Framing(msg) => Self::Framing(msg),
            err @ WireError::FrameTooLarge { .. } => Self::Framing(err.to_string()),
            WireError::Io(e) => Self::Io(e),
        }
    }
}

/// Why a connection or channel was closed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseReason {
    /// Reply code, e.g. 200 for a normal close
    pub reply_code: u16,
    /// Human readable reason
    pub reply_text: String,
    /// Class of the method that caused the close, zero if none
    pub class_id: u16,
    /// Id of the method that caused the close, zero if none
    pub method_id: u16,
}

impl CloseReason {
    /// Create a close reason that does not point at a method
    pub fn new(reply_code: u16, reply_text: impl Into<String>) -> Self {
        Self {
            reply_code,
            reply_text: reply_text.into(),
            class_id: 0,
            method_id: 0,
        }
    }

    /// Decode the arguments of a `connection.close` or `channel.close`
    pub fn parse(args: &Bytes) -> Result<Self, WireError> {
        let mut reader = Reader::new(args.clone());
        Ok(Self {
            reply_code: reader.read_short()?,
            reply_text: reader.read_short_str()?,
            class_id: reader.read_short()?,
            method_id: reader.read_short()?,
        })
    }

    /// Encode as close method arguments
    pub fn encode(&self) -> Result<Bytes, WireError> {
        let mut writer = Writer::new();
        writer.write_short(self.reply_code);
        writer.write_short_str(&self.reply_text)?;
        writer.write_short(self.class_id);
        writer.write_short(self.method_id);
        Ok(writer.finish())
    }

    /// The method the peer blamed for the close, if any
    pub fn offending_method(&self) -> Option<MethodSignature> {
        if self.class_id == 0 && self.method_id == 0 {
            None
        } else {
            Some(MethodSignature::new(self.class_id, self.method_id))
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.reply_code, self.reply_text)?;
        if let Some(signature) = self.offending_method() {
            write!(f, " (caused by {})", signature)?;
        }
        Ok(())
    }
}
