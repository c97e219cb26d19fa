//! Launcher seam: how a worker process is started.
//!
//! The supervisor prepares a [`LaunchSpec`] and hands it to a [`WorkerLauncher`]; what comes
//! back is an owned process handle with two capabilities, "terminate" and "on exit", plus a
//! one-shot readiness signal.
mod error;
pub use error::LaunchError;

use std::{fmt, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use relhost_model::{Env, WorkerKey};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Everything needed to start one worker.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Unique id of this process instance, used in logs.
    pub worker_id: String,
    pub key: WorkerKey,
    /// Full release id the worker serves.
    pub release_id: String,
    /// Unpacked release directory; the process runs here.
    pub workdir: PathBuf,
    /// Unix socket the worker must listen on.
    pub socket_path: PathBuf,
    /// Complete environment of the process.
    pub env: Env,
}

/// How a worker process ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(sig)) => write!(f, "signal {sig}"),
            (None, None) => f.write_str("unknown exit status"),
        }
    }
}

/// Handle to a started worker.
///
/// `ready` fires once the process reports it accepts requests; it is dropped unsent if the
/// process goes away first. `exit` fires exactly once when the process is gone. Cancelling
/// `terminate` asks the launcher to stop the process.
#[derive(Debug)]
pub struct LaunchedWorker {
    pub pid: Option<u32>,
    pub ready: oneshot::Receiver<()>,
    pub exit: oneshot::Receiver<ExitInfo>,
    pub terminate: CancellationToken,
}

/// Starts worker processes.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    /// Launcher name used in logs, worker ids and metrics.
    fn name(&self) -> &'static str;

    async fn launch(&self, spec: &LaunchSpec) -> Result<LaunchedWorker, LaunchError>;
}

/// Shared handle to a launcher.
pub type LauncherHandle = Arc<dyn WorkerLauncher>;
