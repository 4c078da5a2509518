//! Wire format encoding and decoding.
//!
//! Every frame starts with a variable-width length prefix:
//! ```text
//! ┌────────┬──────────────────┬───────────────┐
//! │ Width N│ Length L         │ Payload       │
//! │ 1 byte │ N bytes, uint BE │ L bytes       │
//! └────────┴──────────────────┴───────────────┘
//! ```
//!
//! N must be in `1..=8`. The length field is expanded by right-aligning it
//! into an 8-byte buffer, zero-padded on the left.

use bytes::BufMut;

use crate::error::FrameError;

/// Widest length field supported (a full `u64`).
pub const MAX_LENGTH_WIDTH: u8 = 8;

/// Largest encoded prefix: size byte + 8-byte length field.
pub const MAX_PREFIX_SIZE: usize = 1 + MAX_LENGTH_WIDTH as usize;

/// Default maximum payload size (1 GB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u64 = 1_073_741_824;

/// Decoded length prefix: the size byte and the length it announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthPrefix {
    /// Number of length-field bytes (1-8).
    pub width: u8,
    /// Payload length in bytes.
    pub length: u64,
}

impl LengthPrefix {
    /// Prefix for `length` using the narrowest width that represents it.
    ///
    /// # Example
    ///
    /// ```
    /// use resource_funnel::protocol::LengthPrefix;
    ///
    /// assert_eq!(LengthPrefix::new(5).width, 1);
    /// assert_eq!(LengthPrefix::new(256).width, 2);
    /// assert_eq!(LengthPrefix::new(0).width, 1);
    /// ```
    pub fn new(length: u64) -> Self {
        Self {
            width: minimal_width(length),
            length,
        }
    }

    /// Prefix for `length` with an explicit width.
    pub fn with_width(length: u64, width: u8) -> Result<Self, FrameError> {
        validate_width(width)?;
        if width < minimal_width(length) {
            return Err(FrameError::LengthFieldTooNarrow { length, width });
        }
        Ok(Self { width, length })
    }

    /// Encoded size of this prefix (1 + width).
    #[inline]
    pub fn encoded_len(&self) -> usize {
        1 + self.width as usize
    }

    /// Total frame size this prefix describes (prefix + payload).
    #[inline]
    pub fn frame_len(&self) -> u64 {
        self.encoded_len() as u64 + self.length
    }

    /// Append the encoded prefix to `buf`.
    pub fn encode_into<B: BufMut>(&self, buf: &mut B) {
        let full = self.length.to_be_bytes();
        buf.put_u8(self.width);
        buf.put_slice(&full[full.len() - self.width as usize..]);
    }

    /// Decode a prefix from the start of `buf`.
    ///
    /// Returns `Ok(None)` if `buf` does not yet hold the whole prefix.
    ///
    /// # Example
    ///
    /// ```
    /// use resource_funnel::protocol::LengthPrefix;
    ///
    /// let prefix = LengthPrefix::decode(&[0x02, 0x01, 0x00]).unwrap().unwrap();
    /// assert_eq!(prefix.width, 2);
    /// assert_eq!(prefix.length, 256);
    /// ```
    pub fn decode(buf: &[u8]) -> Result<Option<Self>, FrameError> {
        let Some(&width) = buf.first() else {
            return Ok(None);
        };
        validate_width(width)?;

        let end = 1 + width as usize;
        if buf.len() < end {
            return Ok(None);
        }

        let length = expand_length(&buf[1..end])?;
        Ok(Some(Self { width, length }))
    }

    /// Check the announced payload against `max_payload_size`.
    pub fn check_max(&self, max_payload_size: u64) -> Result<(), FrameError> {
        if self.length > max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                length: self.length,
                max: max_payload_size,
            });
        }
        Ok(())
    }
}

/// Reject size bytes outside `1..=8`.
#[inline]
pub fn validate_width(width: u8) -> Result<(), FrameError> {
    match width {
        0 => Err(FrameError::EmptyLengthField),
        w if w > MAX_LENGTH_WIDTH => Err(FrameError::LengthFieldTooWide(w)),
        _ => Ok(()),
    }
}

/// Expand a 1-8 byte big-endian length field into a `u64`.
pub fn expand_length(field: &[u8]) -> Result<u64, FrameError> {
    if field.is_empty() {
        return Err(FrameError::EmptyLengthField);
    }
    if field.len() > MAX_LENGTH_WIDTH as usize {
        return Err(FrameError::LengthFieldTooWide(
            u8::try_from(field.len()).unwrap_or(u8::MAX),
        ));
    }

    let mut full = [0u8; MAX_LENGTH_WIDTH as usize];
    let gap = full.len() - field.len();
    full[gap..].copy_from_slice(field);
    Ok(u64::from_be_bytes(full))
}

/// Narrowest width (at least 1) that can hold `length`.
#[inline]
pub fn minimal_width(length: u64) -> u8 {
    let significant_bits = u64::BITS - length.leading_zeros();
    (significant_bits.div_ceil(8)).max(1) as u8
}
