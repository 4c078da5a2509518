//! Echo resource - a stub shared resource.
//!
//! Reads frames from stdin and writes each one back unchanged on stdout.
//! Exits cleanly when stdin closes.
//!
//! # Running behind the funnel
//!
//! ```text
//! resource-funnel --port 9000 --path ./target/debug/echo_resource
//! ```
//!
//! A client sending `01 05 68 65 6C 6C 6F` gets the same seven bytes back.

use resource_funnel::protocol::{read_frame, write_frame, DEFAULT_MAX_PAYLOAD_SIZE};
use resource_funnel::FrameError;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), FrameError> {
    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();

    loop {
        let frame = match read_frame(&mut stdin, DEFAULT_MAX_PAYLOAD_SIZE).await {
            Ok(frame) => frame,
            Err(FrameError::Closed) => return Ok(()),
            Err(e) => return Err(e),
        };

        write_frame(&mut stdout, &frame).await?;
    }
}
