//! Frame codec for async streams
//!
//! ```text
//! ┌──────────┬────────────┬──────────────┬─────────┬──────┐
//! │ type     │ channel    │ length       │ payload │ 0xCE │
//! │ 1 byte   │ uint16 BE  │ uint32 BE    │ length  │      │
//! └──────────┴────────────┴──────────────┴─────────┴──────┘
//! ```

use crate::frame::{Frame, FrameType, FRAME_END, FRAME_HEADER_SIZE, FRAME_OVERHEAD};
use crate::WireError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Bytes announcing protocol AMQP 0-8 before any frame
pub const PROTOCOL_HEADER: &[u8; 8] = b"AMQP\x01\x01\x09\x01";

/// Largest frame accepted before tuning (header and terminator included)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 131_072;

/// Frame codec for encoding/decoding frames over async streams
pub struct FrameCodec {
    /// Read buffer for incoming data
    read_buf: BytesMut,
    /// Maximum frame size allowed, header and terminator included
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    /// Create a new frame codec with default settings
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a new frame codec with custom max frame size
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            read_buf: BytesMut::with_capacity(8192),
            max_frame_size,
        }
    }

    /// Current maximum frame size
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Change the maximum frame size, e.g. after tuning
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.max_frame_size = max_frame_size;
    }

    fn check_size(&self, payload_len: usize) -> Result<(), WireError> {
        if payload_len + FRAME_OVERHEAD > self.max_frame_size {
            return Err(WireError::FrameTooLarge {
                size: payload_len + FRAME_OVERHEAD,
                max: self.max_frame_size,
            });
        }
        Ok(())
    }

    /// Encode a frame envelope around its payload
    pub fn encode_frame(&self, frame: &Frame) -> Result<Bytes, WireError> {
        self.check_size(frame.payload.len())?;

        let mut buf = BytesMut::with_capacity(frame.wire_size());
        buf.put_u8(frame.kind as u8);
        buf.put_u16(frame.channel);
        buf.put_u32(frame.payload.len() as u32);
        buf.put_slice(&frame.payload);
        buf.put_u8(FRAME_END);

        Ok(buf.freeze())
    }

    /// Write a frame to an async writer
    pub async fn write_frame<W>(&self, writer: &mut W, frame: &Frame) -> Result<(), WireError>
    where
        W: AsyncWrite + Unpin,
    {
        let encoded = self.encode_frame(frame)?;
        trace!(kind = %frame.kind, channel = frame.channel, size = encoded.len(), "Writing frame");
        writer.write_all(&encoded).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Write the protocol header that opens a connection
    pub async fn write_protocol_header<W>(&self, writer: &mut W) -> Result<(), WireError>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(PROTOCOL_HEADER).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read a frame from an async reader
    ///
    /// Returns `Ok(None)` when the stream ends cleanly between frames.
    pub async fn read_frame<R>(&mut self, reader: &mut R) -> Result<Option<Frame>, WireError>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            // Try to decode a frame from the buffer
            if let Some(frame) = self.try_decode_frame()? {
                trace!(kind = %frame.kind, channel = frame.channel, size = frame.payload.len(), "Read frame");
                return Ok(Some(frame));
            }

            // Need more data, read from the stream
            let mut temp_buf = [0u8; 8192];
            let n = reader.read(&mut temp_buf).await?;

            if n == 0 {
                // EOF reached
                if self.read_buf.is_empty() {
                    return Ok(None);
                } else {
                    return Err(WireError::framing(format!(
                        "stream ended inside a frame ({} bytes buffered)",
                        self.read_buf.len()
                    )));
                }
            }

            self.read_buf.extend_from_slice(&temp_buf[..n]);
        }
    }

    /// Try to decode a frame from the internal buffer
    pub fn try_decode_frame(&mut self) -> Result<Option<Frame>, WireError> {
        if self.read_buf.len() < FRAME_HEADER_SIZE {
            // Not enough data for the header
            return Ok(None);
        }

        // Read the header without consuming it
        let mut header = &self.read_buf[..FRAME_HEADER_SIZE];
        let kind = FrameType::try_from(header.get_u8())?;
        let channel = header.get_u16();
        let payload_len = header.get_u32() as usize;

        self.check_size(payload_len)?;

        // Check if we have the complete frame
        if self.read_buf.len() < FRAME_HEADER_SIZE + payload_len + 1 {
            return Ok(None);
        }

        let end = self.read_buf[FRAME_HEADER_SIZE + payload_len];
        if end != FRAME_END {
            return Err(WireError::framing(format!(
                "unexpected frame terminator 0x{:02X}",
                end
            )));
        }

        self.read_buf.advance(FRAME_HEADER_SIZE);
        let payload = self.read_buf.split_to(payload_len).freeze();
        self.read_buf.advance(1);

        Ok(Some(Frame::new(kind, channel, payload)))
    }

    /// Get the current buffer size
    pub fn buffer_size(&self) -> usize {
        self.read_buf.len()
    }

    /// Clear the internal buffer
    pub fn clear_buffer(&mut self) {
        self.read_buf.clear();
    }
}
