//! Full-read / full-write frame I/O over async streams.
//!
//! The same routines serve client sockets and the resource's stdio. Every
//! read goes through `read_exact`, so a frame is either delivered whole or
//! not at all.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::wire_format::{expand_length, validate_width, LengthPrefix, MAX_PREFIX_SIZE};
use super::Frame;
use crate::error::FrameError;

/// Read exactly one frame from `reader`.
///
/// # Errors
///
/// - [`FrameError::Closed`] if the stream ends before the size byte.
/// - [`FrameError::Truncated`] if it ends anywhere after that.
/// - [`FrameError::EmptyLengthField`] / [`FrameError::LengthFieldTooWide`]
///   for a size byte outside `1..=8`.
/// - [`FrameError::PayloadTooLarge`] if the length exceeds `max_payload_size`.
pub async fn read_frame<R>(reader: &mut R, max_payload_size: u64) -> Result<Frame, FrameError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let width = match reader.read_u8().await {
        Ok(width) => width,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(FrameError::Closed),
        Err(e) => return Err(e.into()),
    };
    validate_width(width)?;

    let mut field = [0u8; MAX_PREFIX_SIZE - 1];
    let field = &mut field[..width as usize];
    read_full(reader, field).await?;

    let prefix = LengthPrefix {
        width,
        length: expand_length(field)?,
    };
    prefix.check_max(max_payload_size)?;

    let payload_len = usize::try_from(prefix.length).map_err(|_| FrameError::PayloadTooLarge {
        length: prefix.length,
        max: max_payload_size,
    })?;

    let header_len = prefix.encoded_len();
    let mut buf = BytesMut::with_capacity(header_len + payload_len);
    buf.put_u8(width);
    buf.put_slice(field);
    buf.resize(header_len + payload_len, 0);
    read_full(reader, &mut buf[header_len..]).await?;

    Ok(Frame::from_validated(buf.freeze(), prefix))
}

/// Write a whole frame and flush.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await
}

async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), FrameError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(FrameError::Truncated {
            expected: buf.len() as u64,
        }),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DEFAULT_MAX_PAYLOAD_SIZE;
    use std::io::Cursor;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{duplex, ReadBuf};

    /// Reader that hands out one byte per poll to exercise partial reads.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
    }

    impl AsyncRead for Trickle {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if self.pos < self.data.len() && buf.remaining() > 0 {
                let byte = self.data[self.pos];
                buf.put_slice(&[byte]);
                self.pos += 1;
            }
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_read_hello_frame() {
        let wire = [0x01, 0x05, 0x68, 0x65, 0x6C, 0x6C, 0x6F];
        let mut reader = Cursor::new(wire.to_vec());

        let frame = read_frame(&mut reader, DEFAULT_MAX_PAYLOAD_SIZE).await.unwrap();

        assert_eq!(frame.as_bytes(), &wire);
        assert_eq!(frame.payload(), b"hello");
    }

    #[tokio::test]
    async fn test_read_keeps_padded_length_field_verbatim() {
        // Non-minimal width must be forwarded as-is, not re-encoded
        let wire = [0x04, 0x00, 0x00, 0x00, 0x02, b'o', b'k'];
        let mut reader = Cursor::new(wire.to_vec());

        let frame = read_frame(&mut reader, DEFAULT_MAX_PAYLOAD_SIZE).await.unwrap();
        assert_eq!(frame.as_bytes(), &wire);
        assert_eq!(frame.length_width(), 4);
    }

    #[tokio::test]
    async fn test_read_survives_one_byte_reads() {
        let frame = Frame::encode_with_width(&[0xAB; 1000], 3).unwrap();
        let mut reader = Trickle {
            data: frame.as_bytes().to_vec(),
            pos: 0,
        };

        let decoded = read_frame(&mut reader, DEFAULT_MAX_PAYLOAD_SIZE).await.unwrap();
        assert_eq!(decoded, frame);
    }

    #[tokio::test]
    async fn test_read_consecutive_frames() {
        let mut wire = Frame::encode(b"one").into_bytes().to_vec();
        wire.extend_from_slice(Frame::encode(b"two").as_bytes());
        let mut reader = Cursor::new(wire);

        let first = read_frame(&mut reader, DEFAULT_MAX_PAYLOAD_SIZE).await.unwrap();
        let second = read_frame(&mut reader, DEFAULT_MAX_PAYLOAD_SIZE).await.unwrap();
        assert_eq!(first.payload(), b"one");
        assert_eq!(second.payload(), b"two");

        let end = read_frame(&mut reader, DEFAULT_MAX_PAYLOAD_SIZE).await;
        assert!(matches!(end, Err(FrameError::Closed)));
    }

    #[tokio::test]
    async fn test_read_zero_width_is_error() {
        let mut reader = Cursor::new(vec![0x00, 0x05]);
        let result = read_frame(&mut reader, DEFAULT_MAX_PAYLOAD_SIZE).await;
        assert!(matches!(result, Err(FrameError::EmptyLengthField)));
    }

    #[tokio::test]
    async fn test_read_width_above_eight_is_error() {
        let mut reader = Cursor::new(vec![0x09; 32]);
        let result = read_frame(&mut reader, DEFAULT_MAX_PAYLOAD_SIZE).await;
        assert!(matches!(result, Err(FrameError::LengthFieldTooWide(9))));
    }

    #[tokio::test]
    async fn test_read_truncated_payload() {
        let mut reader = Cursor::new(vec![0x01, 0x05, b'h', b'e']);
        let result = read_frame(&mut reader, DEFAULT_MAX_PAYLOAD_SIZE).await;
        assert!(matches!(result, Err(FrameError::Truncated { expected: 5 })));
    }

    #[tokio::test]
    async fn test_read_truncated_length_field() {
        let mut reader = Cursor::new(vec![0x03, 0x00]);
        let result = read_frame(&mut reader, DEFAULT_MAX_PAYLOAD_SIZE).await;
        assert!(matches!(result, Err(FrameError::Truncated { expected: 3 })));
    }

    #[tokio::test]
    async fn test_read_rejects_oversized_payload_before_allocating() {
        let mut reader = Cursor::new(vec![0x08, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        let result = read_frame(&mut reader, 1024).await;
        assert!(matches!(
            result,
            Err(FrameError::PayloadTooLarge { length: u64::MAX, max: 1024 })
        ));
    }

    #[tokio::test]
    async fn test_write_then_read_over_duplex() {
        let (mut client, mut server) = duplex(64);
        let frame = Frame::encode(&[0x11; 500]);

        let expected = frame.clone();
        let writer = tokio::spawn(async move { write_frame(&mut client, &frame).await });

        let decoded = read_frame(&mut server, DEFAULT_MAX_PAYLOAD_SIZE).await.unwrap();
        writer.await.unwrap().unwrap();
        assert_eq!(decoded, expected);
    }

    #[tokio::test]
    async fn test_round_trip_lengths_and_widths() {
        for (len, width) in [(0usize, 1u8), (1, 1), (255, 1), (256, 2), (70_000, 3), (9, 8)] {
            let payload = vec![0x5A; len];
            let frame = Frame::encode_with_width(&payload, width).unwrap();

            let mut wire = Vec::new();
            write_frame(&mut wire, &frame).await.unwrap();
            let decoded = read_frame(&mut Cursor::new(wire), DEFAULT_MAX_PAYLOAD_SIZE)
                .await
                .unwrap();

            assert_eq!(decoded.payload_len(), len);
            assert_eq!(decoded.length_width(), width);
            assert_eq!(decoded.payload(), &payload[..]);
        }
    }
}
