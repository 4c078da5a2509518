//! Command-line configuration.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use clap::Parser;

use crate::connection::ConnectionErrorPolicy;
use crate::error::{FunnelError, Result};
use crate::protocol::DEFAULT_MAX_PAYLOAD_SIZE;
use crate::server::ServerBuilder;

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 1111;

/// Share one framed stdio executable with many TCP clients, one request at a time.
#[derive(Debug, Parser)]
#[command(name = "resource-funnel", version)]
pub struct Cli {
    /// Port on which to listen
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Path for shared resource executable
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Address to bind
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// Largest frame payload accepted from clients or the resource, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD_SIZE)]
    pub max_payload: u64,

    /// Exit (status 22) when any client sends an undecodable frame,
    /// instead of dropping only that connection
    #[arg(long)]
    pub fatal_connection_errors: bool,

    /// Print a JSON readiness line to stdout once listening
    #[arg(long)]
    pub announce: bool,
}

impl Cli {
    /// Validate and turn the parsed flags into a server builder.
    ///
    /// `--path` is checked here rather than by clap so its absence maps to
    /// [`FunnelError::MissingPath`].
    pub fn into_builder(self) -> Result<ServerBuilder> {
        let path = match self.path {
            Some(path) if !path.as_os_str().is_empty() => path,
            _ => return Err(FunnelError::MissingPath),
        };

        let policy = if self.fatal_connection_errors {
            ConnectionErrorPolicy::Fatal
        } else {
            ConnectionErrorPolicy::Isolate
        };

        Ok(ServerBuilder::new()
            .bind(self.bind)
            .port(self.port)
            .resource_path(path)
            .max_payload_size(self.max_payload)
            .connection_policy(policy)
            .announce(self.announce))
    }
}
