//! # resource-funnel
//!
//! Shares a single executable, spoken to over its stdin/stdout, with any
//! number of TCP clients while guaranteeing it only ever sees one request at
//! a time, in submission order.
//!
//! ## Architecture
//!
//! - **Protocol**: length-prefixed frames (`N`, `N`-byte big-endian length,
//!   payload), identical on sockets and on the resource's stdio
//! - **Funnel**: one bounded queue, one worker, forward-then-read
//! - **Server**: one task per connection, all submitting to the funnel
//!
//! ## Example
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
//!     eprintln!("{error}");
//!     std::process::exit(error.exit_code());
//! }
//! ```

pub mod announce;
pub mod config;
pub mod connection;
pub mod error;
pub mod funnel;
pub mod protocol;
pub mod resource;
pub mod server;

pub use connection::ConnectionErrorPolicy;
pub use error::{FrameError, FunnelError};
pub use funnel::{Funnel, FunnelHandle, ResourceEndpoint, Response};
pub use protocol::Frame;
pub use server::{Server, ServerBuilder};
