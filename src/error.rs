//! Error types for resource-funnel.
//!
//! Two layers:
//! - [`FrameError`] - codec failures while reading or building a frame.
//! - [`FunnelError`] - system-level failures; each maps to a process exit code.

use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::mpsc;

/// Codec error raised while decoding or encoding a frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The stream ended cleanly before the first byte of a frame.
    #[error("Stream closed")]
    Closed,

    /// The stream ended in the middle of a frame.
    #[error("Stream ended mid-frame: expected {expected} more bytes")]
    Truncated {
        /// Bytes still owed by the stream when it ended.
        expected: u64,
    },

    /// Size byte was 0, so there is no length field to read.
    #[error("Length field is empty")]
    EmptyLengthField,

    /// Size byte exceeds the 8 bytes a `u64` length can occupy.
    #[error("Length field of {0} bytes exceeds the 8-byte maximum")]
    LengthFieldTooWide(u8),

    /// Requested width cannot represent the payload length.
    #[error("Payload length {length} does not fit in a {width}-byte length field")]
    LengthFieldTooNarrow {
        /// Payload length that needed encoding.
        length: u64,
        /// Width that was requested.
        width: u8,
    },

    /// Payload length exceeds the configured maximum.
    #[error("Payload size {length} exceeds maximum {max}")]
    PayloadTooLarge {
        /// Declared payload length.
        length: u64,
        /// Configured limit.
        max: u64,
    },

    /// A buffer that should hold exactly one frame has extra or missing bytes.
    #[error("Buffer holds {actual} bytes but the frame spans {expected}")]
    LengthMismatch {
        /// Bytes the prefix says the frame occupies.
        expected: u64,
        /// Bytes actually supplied.
        actual: usize,
    },

    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Process exit codes, one per failure category.
pub mod exit_code {
    /// `--path` was not supplied.
    pub const MISSING_PATH: i32 = 9;
    /// The listening socket could not be bound.
    pub const LISTEN: i32 = 10;
    /// `accept()` failed on the listening socket.
    pub const ACCEPT: i32 = 11;
    /// The resource process could not be launched.
    pub const LAUNCH: i32 = 12;
    /// Reading a reply from the resource failed.
    pub const RESOURCE_STREAM: i32 = 21;
    /// Decoding a frame from a client failed under the fatal policy.
    pub const CONNECTION_STREAM: i32 = 22;
    /// The funnel's request source was exhausted.
    pub const SOURCE_EXHAUSTED: i32 = 40;
}

/// Main error type for the funnel and its bootstrap.
#[derive(Debug, Error)]
pub enum FunnelError {
    /// No resource executable was configured.
    #[error("No path to resource")]
    MissingPath,

    /// Binding the listening socket failed.
    #[error("Failed to listen on {addr}: {source}")]
    Listen {
        /// Address we tried to bind.
        addr: std::net::SocketAddr,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Accepting a connection failed.
    #[error("Failed to accept connection: {0}")]
    Accept(#[source] std::io::Error),

    /// The resource process could not be started.
    #[error("Resource {path:?} could not be started: {source}")]
    Launch {
        /// Executable path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The child started but one of its stdio pipes was not captured.
    #[error("Resource {0} pipe unavailable")]
    MissingStdio(&'static str),

    /// Decoding the resource's reply failed.
    #[error("Resource stream error: {0}")]
    ResourceStream(#[source] FrameError),

    /// Decoding a client's frame failed.
    #[error("Connection stream error: {0}")]
    ConnectionStream(#[source] FrameError),

    /// Writing a reply back to a client failed.
    #[error("Failed to write reply to client: {0}")]
    ClientWrite(#[source] std::io::Error),

    /// The funnel worker is gone; requests can no longer be submitted.
    #[error("Funnel closed")]
    FunnelClosed,

    /// Every request sender was dropped and the worker ran dry.
    #[error("Resource request source exhausted")]
    RequestSourceExhausted,
}

impl FunnelError {
    /// Exit code the process should terminate with for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            FunnelError::MissingPath => exit_code::MISSING_PATH,
            FunnelError::Listen { .. } => exit_code::LISTEN,
            FunnelError::Accept(_) => exit_code::ACCEPT,
            FunnelError::Launch { .. } | FunnelError::MissingStdio(_) => exit_code::LAUNCH,
            FunnelError::ResourceStream(_) => exit_code::RESOURCE_STREAM,
            FunnelError::ConnectionStream(_) | FunnelError::ClientWrite(_) => {
                exit_code::CONNECTION_STREAM
            }
            FunnelError::FunnelClosed | FunnelError::RequestSourceExhausted => {
                exit_code::SOURCE_EXHAUSTED
            }
        }
    }
}

/// Result type alias using FunnelError.
pub type Result<T> = std::result::Result<T, FunnelError>;

/// Sender half of the process-wide fatal error rendezvous.
///
/// The first error reported wins; later reports are dropped.
#[derive(Debug, Clone)]
pub struct FatalReporter {
    tx: mpsc::Sender<FunnelError>,
}

impl FatalReporter {
    /// Create a reporter and the receiver the server waits on.
    pub fn channel() -> (Self, mpsc::Receiver<FunnelError>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    /// Report a fatal error.
    pub fn report(&self, error: FunnelError) {
        tracing::error!("Fatal: {}", error);
        let _ = self.tx.try_send(error);
    }
}
