//! Resource process supervisor.
//!
//! Launches the shared executable with its stdin/stdout piped to us and
//! hands those pipes to the single funnel worker. stderr is inherited so the
//! resource's own diagnostics end up next to ours.
//!
//! # Example
//!
//! ```ignore
//! use resource_funnel::funnel::Funnel;
//! use resource_funnel::resource::ResourceProcess;
//!
//! let (handle, source) = Funnel::new();
//! let process = ResourceProcess::spawn("./echo_resource")?;
//! process.supervise(source, max_payload, fatal);
//! ```

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;

use crate::error::{FatalReporter, FunnelError, Result};
use crate::funnel::{run_worker, RequestSource, ResourceEndpoint};

/// The running resource and exclusive access to its stdio.
#[derive(Debug)]
pub struct ResourceProcess {
    child: Child,
    endpoint: ResourceEndpoint<ChildStdin, ChildStdout>,
    path: PathBuf,
}

impl ResourceProcess {
    /// Launch the executable at `path`.
    ///
    /// The child is killed when this value (or the worker owning it) is
    /// dropped.
    pub fn spawn(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut child = Command::new(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| FunnelError::Launch {
                path: path.clone(),
                source,
            })?;

        let input = child.stdin.take().ok_or(FunnelError::MissingStdio("stdin"))?;
        let output = child
            .stdout
            .take()
            .ok_or(FunnelError::MissingStdio("stdout"))?;

        tracing::info!(path = %path.display(), pid = ?child.id(), "Resource started");

        Ok(Self {
            child,
            endpoint: ResourceEndpoint::new(input, output),
            path,
        })
    }

    /// OS process id, if the child is still running.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Executable path this process was launched from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move the process onto the dedicated worker task.
    ///
    /// The worker owns the streams for the rest of the program. If the
    /// request source is exhausted the child is killed and
    /// [`FunnelError::RequestSourceExhausted`] is reported; a resource stream
    /// failure is reported as-is.
    pub fn supervise(
        self,
        source: RequestSource,
        max_payload_size: u64,
        fatal: FatalReporter,
    ) -> JoinHandle<()> {
        let Self {
            mut child,
            mut endpoint,
            path,
        } = self;

        tokio::spawn(async move {
            let error = match run_worker(source, &mut endpoint, max_payload_size).await {
                Ok(()) => FunnelError::RequestSourceExhausted,
                Err(e) => e,
            };

            drop(endpoint);
            if let Err(e) = child.kill().await {
                tracing::warn!(path = %path.display(), "Failed to kill resource: {}", e);
            } else {
                tracing::info!(path = %path.display(), "Resource terminated");
            }

            fatal.report(error);
        })
    }
}
