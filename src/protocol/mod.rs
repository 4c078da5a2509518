//! Protocol module - wire format, framing, and frame I/O.
//!
//! This module implements the length-prefixed framing used on both the
//! client sockets and the resource's stdio:
//! - Variable-width length prefix encoding/decoding
//! - Opaque [`Frame`] carrying the complete wire bytes
//! - Full-read/full-write helpers over async streams

mod frame;
mod stream;
mod wire_format;

pub use frame::Frame;
pub use stream::{read_frame, write_frame};
pub use wire_format::{
    expand_length, minimal_width, validate_width, LengthPrefix, DEFAULT_MAX_PAYLOAD_SIZE,
    MAX_LENGTH_WIDTH, MAX_PREFIX_SIZE,
};
