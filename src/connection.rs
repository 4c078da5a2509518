//! Per-connection loop.
//!
//! Decode a frame, push it through the funnel, wait for the single reply,
//! write it back. Clients must not pipeline: the next frame is only read
//! after the previous reply has been written.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::error::{FrameError, FunnelError, Result};
use crate::funnel::FunnelHandle;
use crate::protocol::{read_frame, write_frame};

/// How a connection-level decode failure is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionErrorPolicy {
    /// Drop only the offending connection.
    #[default]
    Isolate,
    /// Terminate the whole process (exit code 22) on a decode failure, a
    /// client disconnect, or a failed reply write.
    Fatal,
}

/// Why a connection ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEnd {
    /// The client closed its side at a frame boundary.
    Disconnected,
    /// The funnel answered with a close-flagged response.
    ClosedByFunnel,
}

/// Serve one client until it disconnects or is told to close.
///
/// # Errors
///
/// - [`FunnelError::ConnectionStream`] if a frame from the client is invalid
///   or cut short.
/// - [`FunnelError::ClientWrite`] if the reply cannot be written back.
/// - [`FunnelError::FunnelClosed`] if the worker is gone.
pub async fn handle_connection<S>(
    mut stream: S,
    funnel: FunnelHandle,
    max_payload_size: u64,
) -> Result<ConnectionEnd>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let frame = match read_frame(&mut stream, max_payload_size).await {
            Ok(frame) => frame,
            Err(FrameError::Closed) => return Ok(ConnectionEnd::Disconnected),
            Err(e) => return Err(FunnelError::ConnectionStream(e)),
        };

        let response = funnel.call(frame).await?;

        if let Some(payload) = &response.payload {
            write_frame(&mut stream, payload)
                .await
                .map_err(FunnelError::ClientWrite)?;
        }

        if response.close {
            if let Err(e) = stream.shutdown().await {
                tracing::debug!("Error shutting down connection: {}", e);
            }
            return Ok(ConnectionEnd::ClosedByFunnel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FatalReporter;
    use crate::funnel::{spawn_worker, Funnel, ResourceEndpoint};
    use crate::protocol::{Frame, DEFAULT_MAX_PAYLOAD_SIZE};
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{duplex, AsyncReadExt};

    /// Funnel backed by an in-memory resource that echoes every frame.
    fn echo_funnel() -> FunnelHandle {
        let (handle, source) = Funnel::new();
        let (ours, theirs) = duplex(64 * 1024);
        let (our_read, our_write) = tokio::io::split(ours);
        let (mut their_read, mut their_write) = tokio::io::split(theirs);

        tokio::spawn(async move {
            while let Ok(frame) = read_frame(&mut their_read, DEFAULT_MAX_PAYLOAD_SIZE).await {
                if write_frame(&mut their_write, &frame).await.is_err() {
                    break;
                }
            }
        });

        let (fatal, _fatal_rx) = FatalReporter::channel();
        spawn_worker(
            source,
            ResourceEndpoint::new(our_write, our_read),
            DEFAULT_MAX_PAYLOAD_SIZE,
            fatal,
        );
        handle
    }

    /// Writer whose every write fails, so the funnel answers "close".
    struct BrokenPipe;

    impl tokio::io::AsyncWrite for BrokenPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_sequential_requests_get_replies_in_order() {
        let funnel = echo_funnel();
        let (mut client, server) = duplex(4096);
        let task = tokio::spawn(handle_connection(server, funnel, DEFAULT_MAX_PAYLOAD_SIZE));

        for label in [&b"R1"[..], b"R2", b"R3"] {
            let frame = Frame::encode(label);
            write_frame(&mut client, &frame).await.unwrap();
            let reply = read_frame(&mut client, DEFAULT_MAX_PAYLOAD_SIZE).await.unwrap();
            assert_eq!(reply, frame);
        }

        drop(client);
        assert_eq!(task.await.unwrap().unwrap(), ConnectionEnd::Disconnected);
    }

    #[tokio::test]
    async fn test_hello_bytes_echoed_verbatim() {
        let funnel = echo_funnel();
        let (mut client, server) = duplex(4096);
        tokio::spawn(handle_connection(server, funnel, DEFAULT_MAX_PAYLOAD_SIZE));

        let wire = [0x01, 0x05, 0x68, 0x65, 0x6C, 0x6C, 0x6F];
        client.write_all(&wire).await.unwrap();

        let mut reply = [0u8; 7];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, wire);
    }

    #[tokio::test]
    async fn test_invalid_frame_ends_connection_with_error() {
        let funnel = echo_funnel();
        let (mut client, server) = duplex(4096);
        let task = tokio::spawn(handle_connection(server, funnel, DEFAULT_MAX_PAYLOAD_SIZE));

        client.write_all(&[0x00]).await.unwrap();

        let result = task.await.unwrap();
        let error = result.unwrap_err();
        assert!(matches!(
            error,
            FunnelError::ConnectionStream(FrameError::EmptyLengthField)
        ));
        assert_eq!(error.exit_code(), 22);
    }

    #[tokio::test]
    async fn test_truncated_frame_is_a_stream_error() {
        let funnel = echo_funnel();
        let (mut client, server) = duplex(4096);
        let task = tokio::spawn(handle_connection(server, funnel, DEFAULT_MAX_PAYLOAD_SIZE));

        client.write_all(&[0x01, 0x05, b'h']).await.unwrap();
        drop(client);

        let result = task.await.unwrap();
        assert!(matches!(
            result,
            Err(FunnelError::ConnectionStream(FrameError::Truncated { .. }))
        ));
    }

    #[tokio::test]
    async fn test_close_response_stops_reading() {
        let (funnel, source) = Funnel::new();
        let (_keep_open, silent) = duplex(16);
        let (fatal, _fatal_rx) = FatalReporter::channel();
        spawn_worker(
            source,
            ResourceEndpoint::new(BrokenPipe, silent),
            DEFAULT_MAX_PAYLOAD_SIZE,
            fatal,
        );

        let (mut client, server) = duplex(4096);
        let task = tokio::spawn(handle_connection(server, funnel, DEFAULT_MAX_PAYLOAD_SIZE));

        // Second frame is already queued on the socket but must never be read
        let mut wire = Frame::encode(b"first").into_bytes().to_vec();
        wire.extend_from_slice(Frame::encode(b"second").as_bytes());
        client.write_all(&wire).await.unwrap();

        assert_eq!(task.await.unwrap().unwrap(), ConnectionEnd::ClosedByFunnel);

        // Nothing was written back, and the server side is shut down
        let mut buf = Vec::new();
        let n = client.read_to_end(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_funnel_gone_is_reported() {
        let (funnel, source) = Funnel::new();
        drop(source);

        let (mut client, server) = duplex(4096);
        let task = tokio::spawn(handle_connection(server, funnel, DEFAULT_MAX_PAYLOAD_SIZE));
        write_frame(&mut client, &Frame::encode(b"hi")).await.unwrap();

        assert!(matches!(
            task.await.unwrap(),
            Err(FunnelError::FunnelClosed)
        ));
    }
}
