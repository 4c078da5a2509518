//! Request funnel: one queue, one worker, one request in flight.
//!
//! Every connection submits through a cloned [`FunnelHandle`]. A single
//! worker drains the [`RequestSource`] and talks to the resource strictly
//! forward-then-read, which is what serializes access.
//!
//! # Architecture
//!
//! ```text
//! Connection 1 ─┐
//! Connection 2 ─┼─► mpsc::Sender<Request> ─► Worker ─► resource stdin
//! Connection N ─┘         ▲                    │
//!                         └── oneshot reply ◄──┴─ resource stdout
//! ```
//!
//! The queue holds a single request, so a busy resource stalls submitters;
//! that is the only backpressure. Waiting senders are admitted in FIFO order.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{FatalReporter, FrameError, FunnelError, Result};
use crate::protocol::{read_frame, write_frame, Frame};

/// Queue depth between connections and the worker.
pub const FUNNEL_CAPACITY: usize = 1;

/// Reply delivered to the submitting connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Reply frame; `None` when forwarding to the resource failed.
    pub payload: Option<Frame>,
    /// Close the connection after delivering `payload`.
    pub close: bool,
}

impl Response {
    /// Normal reply: deliver the frame, keep the connection open.
    pub fn reply(frame: Frame) -> Self {
        Self {
            payload: Some(frame),
            close: false,
        }
    }

    /// Upstream write failed: nothing to deliver, close the connection.
    pub fn closed() -> Self {
        Self {
            payload: None,
            close: true,
        }
    }
}

/// A frame paired with the private slot its reply goes back through.
#[derive(Debug)]
pub struct Request {
    /// Complete frame as decoded from the connection.
    pub frame: Frame,
    reply: oneshot::Sender<Response>,
}

impl Request {
    /// Create a request and the receiver its reply will arrive on.
    pub fn new(frame: Frame) -> (Self, oneshot::Receiver<Response>) {
        let (reply, rx) = oneshot::channel();
        (Self { frame, reply }, rx)
    }

    /// Deliver the response, consuming the request.
    fn respond(self, response: Response) {
        if self.reply.send(response).is_err() {
            tracing::debug!("Requester went away before its reply was delivered");
        }
    }
}

/// Constructor for the funnel's two ends.
#[derive(Debug)]
pub struct Funnel;

impl Funnel {
    /// Create a connected handle/source pair.
    pub fn new() -> (FunnelHandle, RequestSource) {
        let (tx, rx) = mpsc::channel(FUNNEL_CAPACITY);
        (FunnelHandle { tx }, RequestSource { rx })
    }
}

/// Submission side of the funnel. Cheap to clone, one per connection.
#[derive(Debug, Clone)]
pub struct FunnelHandle {
    tx: mpsc::Sender<Request>,
}

impl FunnelHandle {
    /// Queue `frame` for the resource.
    ///
    /// Waits until the queue accepts the request. Resolves to the receiver
    /// for the eventual [`Response`].
    pub async fn submit(&self, frame: Frame) -> Result<oneshot::Receiver<Response>> {
        let (request, rx) = Request::new(frame);
        self.tx
            .send(request)
            .await
            .map_err(|_| FunnelError::FunnelClosed)?;
        Ok(rx)
    }

    /// Submit `frame` and wait for its response.
    pub async fn call(&self, frame: Frame) -> Result<Response> {
        let rx = self.submit(frame).await?;
        rx.await.map_err(|_| FunnelError::FunnelClosed)
    }

    /// Whether the worker has stopped receiving.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of the funnel; owned by exactly one worker.
#[derive(Debug)]
pub struct RequestSource {
    rx: mpsc::Receiver<Request>,
}

impl RequestSource {
    /// Next request, or `None` once every handle is dropped.
    pub async fn recv(&mut self) -> Option<Request> {
        self.rx.recv().await
    }
}

/// Exclusive access to the resource's input and output streams.
#[derive(Debug)]
pub struct ResourceEndpoint<W, R> {
    /// Resource input (its stdin).
    pub input: W,
    /// Resource output (its stdout).
    pub output: R,
}

impl<W, R> ResourceEndpoint<W, R> {
    /// Bundle an input writer and output reader.
    pub fn new(input: W, output: R) -> Self {
        Self { input, output }
    }
}

/// Worker loop: forward each request, read exactly one reply.
///
/// Returns `Ok(())` only when the source is exhausted. Any I/O failure on
/// the resource's streams ends the worker with [`FunnelError::ResourceStream`].
/// On a write failure the requester is first answered with
/// [`Response::closed`] and the read is skipped, since the resource was never
/// handed a request to answer.
pub async fn run_worker<W, R>(
    mut source: RequestSource,
    endpoint: &mut ResourceEndpoint<W, R>,
    max_payload_size: u64,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    while let Some(request) = source.recv().await {
        tracing::trace!(len = request.frame.len(), "Forwarding request to resource");

        if let Err(e) = write_frame(&mut endpoint.input, &request.frame).await {
            tracing::warn!("Failed to write request to resource: {}", e);
            request.respond(Response::closed());
            return Err(FunnelError::ResourceStream(FrameError::Io(e)));
        }

        let reply = read_frame(&mut endpoint.output, max_payload_size)
            .await
            .map_err(FunnelError::ResourceStream)?;

        tracing::trace!(len = reply.len(), "Resource replied");
        request.respond(Response::reply(reply));
    }

    Ok(())
}

/// Spawn the worker on its own task for an injected endpoint.
///
/// Whatever ends the worker is reported through `fatal`: a resource stream
/// error, or [`FunnelError::RequestSourceExhausted`].
pub fn spawn_worker<W, R>(
    source: RequestSource,
    mut endpoint: ResourceEndpoint<W, R>,
    max_payload_size: u64,
    fatal: FatalReporter,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let error = match run_worker(source, &mut endpoint, max_payload_size).await {
            Ok(()) => FunnelError::RequestSourceExhausted,
            Err(e) => e,
        };
        fatal.report(error);
    })
}
