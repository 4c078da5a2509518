//! Readiness announcement on stdout.
//!
//! When enabled, the server prints one JSON line once it is listening so a
//! supervisor (or a test harness started with `--port 0`) can learn the
//! bound address without scraping logs.
//!
//! # Important
//!
//! - **stdout**: announcement only (one JSON object per line)
//! - **stderr**: logs
//! - Lines end with an explicit `\n`, not `println!`

use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;

use serde::Serialize;

/// The readiness line written once the listener is bound.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Listening<'a> {
    /// Always `"listening"`.
    pub event: &'static str,
    /// Address the server accepted connections on.
    pub address: SocketAddr,
    /// Resource executable path, if one was launched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<&'a Path>,
    /// This process's id.
    pub pid: u32,
}

impl<'a> Listening<'a> {
    /// Build the announcement for `address`.
    pub fn new(address: SocketAddr, resource: Option<&'a Path>) -> Self {
        Self {
            event: "listening",
            address,
            resource,
            pid: std::process::id(),
        }
    }
}

/// Write a line to `out` followed by a single `\n`, then flush.
pub fn write_line<W: Write>(out: &mut W, line: &str) -> std::io::Result<()> {
    out.write_all(line.as_bytes())?;
    out.write_all(b"\n")?;
    out.flush()
}

/// Serialize `value` as one JSON line on `out`.
pub fn write_json_line<W: Write, T: Serialize>(out: &mut W, value: &T) -> std::io::Result<()> {
    let json = serde_json::to_string(value).map_err(std::io::Error::other)?;
    write_line(out, &json)
}

/// Announce readiness on stdout.
pub fn announce_listening(address: SocketAddr, resource: Option<&Path>) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    write_json_line(&mut handle, &Listening::new(address, resource))
}
