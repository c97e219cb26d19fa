use std::{io, process::ExitStatus, process::Stdio, time::Duration};

use async_trait::async_trait;
use tokio::{
    process::{Child, Command},
    sync::oneshot,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use relhost_core::launcher::{ExitInfo, LaunchError, LaunchSpec, LaunchedWorker, WorkerLauncher};

use crate::{
    ExecError, ProcessLauncherConfig, attach_rlimits,
    output::{Stream, pump},
};

/// Runs each worker as a child process of the host.
///
/// The process starts inside the release directory with the environment from the
/// [`LaunchSpec`]. Readiness is a stdout line equal to the configured marker. Termination sends
/// `SIGTERM` and escalates to `SIGKILL` after the grace period.
pub struct ProcessLauncher {
    cfg: ProcessLauncherConfig,
}

impl ProcessLauncher {
    pub fn new(cfg: ProcessLauncherConfig) -> Result<Self, ExecError> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    pub fn config(&self) -> &ProcessLauncherConfig {
        &self.cfg
    }

    fn command(&self, spec: &LaunchSpec) -> Command {
        let mut cmd = Command::new(&self.cfg.program);
        cmd.args(&self.cfg.args)
            .current_dir(&spec.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if !self.cfg.inherit_env {
            cmd.env_clear();
            if let Some(path) = std::env::var_os("PATH") {
                cmd.env("PATH", path);
            }
        }
        for (key, value) in spec.env.effective() {
            cmd.env(key, value);
        }
        if let Some(limits) = &self.cfg.rlimits {
            attach_rlimits(&mut cmd, limits);
        }
        cmd
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    fn name(&self) -> &'static str {
        "process"
    }

    #[instrument(level = "debug", skip(self, spec), fields(worker = %spec.worker_id))]
    async fn launch(&self, spec: &LaunchSpec) -> Result<LaunchedWorker, LaunchError> {
        if !spec.workdir.is_dir() {
            return Err(LaunchError::InvalidSpec(format!(
                "workdir {} is not a directory",
                spec.workdir.display()
            )));
        }

        trace!(program = %self.cfg.program, args = ?self.cfg.args, "spawning worker process");
        let mut child = self
            .command(spec)
            .spawn()
            .map_err(|e| LaunchError::Spawn {
                program: self.cfg.program.clone(),
                reason: e.to_string(),
            })?;
        let pid = child.id();

        let (ready_tx, ready_rx) = oneshot::channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump(
                stdout,
                Stream::Stdout,
                spec.worker_id.clone(),
                self.cfg.output,
                Some(self.cfg.ready_marker.clone()),
                Some(ready_tx),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump(
                stderr,
                Stream::Stderr,
                spec.worker_id.clone(),
                self.cfg.output,
                None,
                None,
            ));
        }

        let (exit_tx, exit_rx) = oneshot::channel();
        let terminate = CancellationToken::new();
        tokio::spawn(watch(
            child,
            terminate.clone(),
            self.cfg.terminate_grace,
            spec.worker_id.clone(),
            exit_tx,
        ));

        info!(pid = ?pid, workdir = %spec.workdir.display(), "worker process started");
        Ok(LaunchedWorker {
            pid,
            ready: ready_rx,
            exit: exit_rx,
            terminate,
        })
    }
}

/// Own the child until it is gone, then report how it ended.
async fn watch(
    mut child: Child,
    terminate: CancellationToken,
    grace: Duration,
    worker: String,
    exit_tx: oneshot::Sender<ExitInfo>,
) {
    let exited = tokio::select! {
        res = child.wait() => Some(res),
        _ = terminate.cancelled() => None,
    };
    let status = match exited {
        Some(res) => res,
        None => stop(&mut child, grace, &worker).await,
    };

    let info = match status {
        Ok(status) => exit_info(status),
        Err(e) => {
            warn!(worker = %worker, error = %e, "failed to wait for worker process");
            ExitInfo::default()
        }
    };
    debug!(worker = %worker, exit = %info, "worker process exited");
    let _ = exit_tx.send(info);
}

async fn stop(child: &mut Child, grace: Duration, worker: &str) -> io::Result<ExitStatus> {
    let Some(pid) = child.id() else {
        return child.wait().await;
    };
    debug!(worker = %worker, pid, "sending SIGTERM");
    signal_term(child, pid);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(res) => res,
        Err(_) => {
            warn!(worker = %worker, pid, grace_ms = grace.as_millis() as u64, "worker ignored SIGTERM; killing");
            child.kill().await?;
            child.wait().await
        }
    }
}

#[cfg(unix)]
fn signal_term(_child: &mut Child, pid: u32) {
    // SAFETY: plain kill(2) on a pid we still own; the child has not been reaped yet.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc != 0 {
        debug!(pid, error = %io::Error::last_os_error(), "SIGTERM failed");
    }
}

#[cfg(not(unix))]
fn signal_term(child: &mut Child, _pid: u32) {
    let _ = child.start_kill();
}

#[cfg(unix)]
fn exit_info(status: ExitStatus) -> ExitInfo {
    use std::os::unix::process::ExitStatusExt;
    ExitInfo {
        code: status.code(),
        signal: status.signal(),
    }
}

#[cfg(not(unix))]
fn exit_info(status: ExitStatus) -> ExitInfo {
    ExitInfo {
        code: status.code(),
        signal: None,
    }
}
