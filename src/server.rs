//! Server builder and accept loop.
//!
//! The [`ServerBuilder`] provides a fluent API for configuring the server.
//! [`ServerBuilder::start`] runs the startup sequence:
//! 1. Launch the resource and hand its stdio to the funnel worker
//! 2. Bind the listening socket
//! 3. Optionally announce readiness on stdout
//!
//! [`Server::run`] then accepts connections until something fatal happens.
//!
//! # Example
//!
//! ```ignore
//! use resource_funnel::ServerBuilder;
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = ServerBuilder::new()
//!         .port(9000)
//!         .resource_path("./echo_resource")
//!         .start()
//!         .await
//!         .unwrap();
//!
//!     let error = server.run().await;
//!     std::process::exit(error.exit_code());
//! }
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::announce::announce_listening;
use crate::config::DEFAULT_PORT;
use crate::connection::{handle_connection, ConnectionEnd, ConnectionErrorPolicy};
use crate::error::{FatalReporter, FrameError, FunnelError, Result};
use crate::funnel::{spawn_worker, Funnel, FunnelHandle, ResourceEndpoint};
use crate::protocol::DEFAULT_MAX_PAYLOAD_SIZE;
use crate::resource::ResourceProcess;

/// Settings collected by [`ServerBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind: IpAddr,
    /// TCP port (0 picks an ephemeral port).
    pub port: u16,
    /// Resource executable; required by [`ServerBuilder::start`].
    pub resource_path: Option<PathBuf>,
    /// Largest payload accepted on any stream.
    pub max_payload_size: u64,
    /// What a bad client frame does.
    pub policy: ConnectionErrorPolicy,
    /// Print a JSON readiness line once listening.
    pub announce: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            resource_path: None,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            policy: ConnectionErrorPolicy::default(),
            announce: false,
        }
    }
}

/// Builder for configuring and starting a [`Server`].
#[derive(Debug, Clone, Default)]
pub struct ServerBuilder {
    config: ServerConfig,
}

impl ServerBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bind address.
    ///
    /// Default: 0.0.0.0
    pub fn bind(mut self, addr: IpAddr) -> Self {
        self.config.bind = addr;
        self
    }

    /// Set the TCP port.
    ///
    /// Default: 1111
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the resource executable.
    pub fn resource_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.resource_path = Some(path.into());
        self
    }

    /// Set the maximum payload size.
    ///
    /// Default: 1 GB
    pub fn max_payload_size(mut self, limit: u64) -> Self {
        self.config.max_payload_size = limit;
        self
    }

    /// Set the connection error policy.
    ///
    /// Default: [`ConnectionErrorPolicy::Isolate`]
    pub fn connection_policy(mut self, policy: ConnectionErrorPolicy) -> Self {
        self.config.policy = policy;
        self
    }

    /// Enable the stdout readiness announcement.
    pub fn announce(mut self, enabled: bool) -> Self {
        self.config.announce = enabled;
        self
    }

    /// Current settings.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Launch the resource process, then bind.
    ///
    /// Nothing is listening if the resource fails to start.
    pub async fn start(self) -> Result<Server> {
        let path = self
            .config
            .resource_path
            .clone()
            .ok_or(FunnelError::MissingPath)?;

        let (handle, source) = Funnel::new();
        let (fatal, fatal_rx) = FatalReporter::channel();

        let process = ResourceProcess::spawn(&path)?;
        let worker = process.supervise(source, self.config.max_payload_size, fatal.clone());

        Server::bind(self.config, handle, fatal, fatal_rx, worker).await
    }

    /// Start against an already connected resource endpoint.
    ///
    /// Used to put an in-memory or otherwise pre-opened resource behind the
    /// server instead of launching a process.
    pub async fn start_with_endpoint<W, R>(self, endpoint: ResourceEndpoint<W, R>) -> Result<Server>
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (handle, source) = Funnel::new();
        let (fatal, fatal_rx) = FatalReporter::channel();
        let worker = spawn_worker(source, endpoint, self.config.max_payload_size, fatal.clone());

        Server::bind(self.config, handle, fatal, fatal_rx, worker).await
    }
}

/// A bound server with a running funnel worker.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    funnel: FunnelHandle,
    fatal: FatalReporter,
    fatal_rx: mpsc::Receiver<FunnelError>,
    worker: JoinHandle<()>,
}

impl Server {
    async fn bind(
        config: ServerConfig,
        funnel: FunnelHandle,
        fatal: FatalReporter,
        fatal_rx: mpsc::Receiver<FunnelError>,
        worker: JoinHandle<()>,
    ) -> Result<Self> {
        let addr = SocketAddr::new(config.bind, config.port);
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(source) => {
                // Dropping the worker's state takes the resource down with it
                worker.abort();
                return Err(FunnelError::Listen { addr, source });
            }
        };

        let server = Self {
            listener,
            config,
            funnel,
            fatal,
            fatal_rx,
            worker,
        };

        let local = server.local_addr()?;
        tracing::info!(address = %local, "Listening");

        if server.config.announce {
            if let Err(e) = announce_listening(local, server.config.resource_path.as_deref()) {
                tracing::warn!("Failed to write readiness announcement: {}", e);
            }
        }

        Ok(server)
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(|source| FunnelError::Listen {
            addr: SocketAddr::new(self.config.bind, self.config.port),
            source,
        })
    }

    /// Settings this server was started with.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Accept connections until a fatal error occurs, and return it.
    ///
    /// Accepting is never blocked by a busy resource; a new connection only
    /// waits once it submits its first request.
    pub async fn run(mut self) -> FunnelError {
        let error = loop {
            tokio::select! {
                biased;

                Some(error) = self.fatal_rx.recv() => break error,

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer),
                    Err(e) => break FunnelError::Accept(e),
                },
            }
        };

        // Wait for the cancelled worker so the resource is dropped (and the
        // child killed) before the caller exits the process
        self.worker.abort();
        let _ = self.worker.await;
        error
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%peer, "Failed to set TCP_NODELAY: {}", e);
        }
        self.serve(stream, peer);
    }

    /// Run a connection handler for `stream` and apply the error policy to
    /// its outcome.
    fn serve<S>(&self, stream: S, peer: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let funnel = self.funnel.clone();
        let fatal = self.fatal.clone();
        let policy = self.config.policy;
        let max_payload_size = self.config.max_payload_size;

        tracing::debug!(%peer, "Accepted connection");

        tokio::spawn(async move {
            let outcome = handle_connection(stream, funnel, max_payload_size).await;
            match (outcome, policy) {
                (Ok(ConnectionEnd::Disconnected), ConnectionErrorPolicy::Fatal) => {
                    fatal.report(FunnelError::ConnectionStream(FrameError::Closed));
                }
                (Ok(end), _) => {
                    tracing::debug!(%peer, ?end, "Connection finished");
                }
                (
                    Err(error @ (FunnelError::ConnectionStream(_) | FunnelError::ClientWrite(_))),
                    ConnectionErrorPolicy::Fatal,
                ) => {
                    fatal.report(error);
                }
                (Err(FunnelError::FunnelClosed), _) => {
                    tracing::debug!(%peer, "Connection ended: funnel closed");
                }
                (Err(error), _) => {
                    tracing::warn!(%peer, "Connection dropped: {}", error);
                }
            }
        });
    }
}
