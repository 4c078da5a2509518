//! Opaque frame type.
//!
//! A [`Frame`] holds the complete wire bytes of one message (size byte,
//! length field and payload) in a single `bytes::Bytes`. Frames read from a
//! client are forwarded to the resource unchanged, and vice versa, so the
//! blob is never re-encoded once decoded.
//!
//! # Example
//!
//! ```
//! use resource_funnel::protocol::Frame;
//!
//! let frame = Frame::encode(b"hello");
//! assert_eq!(frame.as_bytes(), &[0x01, 0x05, b'h', b'e', b'l', b'l', b'o']);
//! assert_eq!(frame.payload(), b"hello");
//! ```

use bytes::{Bytes, BytesMut};

use super::wire_format::LengthPrefix;
use crate::error::FrameError;

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Full wire bytes (prefix + payload).
    bytes: Bytes,
    /// Decoded prefix, kept for accessors.
    prefix: LengthPrefix,
}

impl Frame {
    /// Encode `payload` with the narrowest length field.
    pub fn encode(payload: &[u8]) -> Self {
        Self::build(LengthPrefix::new(payload.len() as u64), payload)
    }

    /// Encode `payload` with an explicit length-field width.
    pub fn encode_with_width(payload: &[u8], width: u8) -> Result<Self, FrameError> {
        let prefix = LengthPrefix::with_width(payload.len() as u64, width)?;
        Ok(Self::build(prefix, payload))
    }

    fn build(prefix: LengthPrefix, payload: &[u8]) -> Self {
        let mut buf = BytesMut::with_capacity(prefix.encoded_len() + payload.len());
        prefix.encode_into(&mut buf);
        buf.extend_from_slice(payload);
        Self {
            bytes: buf.freeze(),
            prefix,
        }
    }

    /// Wrap bytes that must contain exactly one complete frame.
    pub fn from_bytes(bytes: Bytes) -> Result<Self, FrameError> {
        let Some(prefix) = LengthPrefix::decode(&bytes)? else {
            let needed = bytes.first().map_or(1, |&width| 1 + width as usize);
            return Err(FrameError::Truncated {
                expected: (needed - bytes.len()) as u64,
            });
        };

        if prefix.frame_len() != bytes.len() as u64 {
            return Err(FrameError::LengthMismatch {
                expected: prefix.frame_len(),
                actual: bytes.len(),
            });
        }

        Ok(Self { bytes, prefix })
    }

    /// Assemble a frame from already validated parts.
    pub(crate) fn from_validated(bytes: Bytes, prefix: LengthPrefix) -> Self {
        debug_assert_eq!(prefix.frame_len(), bytes.len() as u64);
        Self { bytes, prefix }
    }

    /// The complete wire bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the frame, returning its wire bytes (cheap, zero-copy).
    #[inline]
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    /// Total wire length (prefix + payload).
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Frames always carry at least a size byte and one length byte.
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The decoded length prefix.
    #[inline]
    pub fn prefix(&self) -> LengthPrefix {
        self.prefix
    }

    /// Width of the length field (N).
    #[inline]
    pub fn length_width(&self) -> u8 {
        self.prefix.width
    }

    /// Payload bytes, without the prefix.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.bytes[self.prefix.encoded_len()..]
    }

    /// Payload length (L).
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.bytes.len() - self.prefix.encoded_len()
    }
}
