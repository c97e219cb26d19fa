use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use relhost_model::{Env, WorkerKey};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::launcher::{ExitInfo, LaunchSpec};

/// Live worker owned by the supervisor.
///
/// Callers get an `Arc` to forward requests through; the only lifecycle operations are
/// [`WorkerHandle::terminate`] and [`WorkerHandle::wait_exit`].
#[derive(Debug)]
pub struct WorkerHandle {
    id: String,
    key: WorkerKey,
    release_id: String,
    pid: Option<u32>,
    workdir: PathBuf,
    socket_path: PathBuf,
    env: Env,
    generation: u64,
    started_at: Instant,
    terminate: CancellationToken,
    closed: CancellationToken,
    exit: Mutex<Option<ExitInfo>>,
}

impl WorkerHandle {
    pub(crate) fn new(
        spec: LaunchSpec,
        pid: Option<u32>,
        generation: u64,
        terminate: CancellationToken,
    ) -> Self {
        Self {
            id: spec.worker_id,
            key: spec.key,
            release_id: spec.release_id,
            pid,
            workdir: spec.workdir,
            socket_path: spec.socket_path,
            env: spec.env,
            generation,
            started_at: Instant::now(),
            terminate,
            closed: CancellationToken::new(),
            exit: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key(&self) -> &WorkerKey {
        &self.key
    }

    pub fn release_id(&self) -> &str {
        &self.release_id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Unix socket serving the worker's HTTP interface.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Environment the process was started with.
    pub fn env(&self) -> &Env {
        &self.env
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Ask the process to stop. Returns immediately.
    pub fn terminate(&self) {
        self.terminate.cancel();
    }

    pub fn is_alive(&self) -> bool {
        !self.closed.is_cancelled()
    }

    pub fn exit_info(&self) -> Option<ExitInfo> {
        *self.exit.lock()
    }

    /// Wait until the process is gone.
    pub async fn wait_exit(&self) -> Option<ExitInfo> {
        self.closed.cancelled().await;
        self.exit_info()
    }

    pub(crate) fn mark_exited(&self, info: Option<ExitInfo>) {
        *self.exit.lock() = info;
        self.closed.cancel();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Starting,
    Ready,
}

/// Registry snapshot entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerInfo {
    pub key: String,
    pub application_id: String,
    pub release_key: String,
    pub release_id: String,
    pub state: WorkerState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_ms: Option<u64>,
}
