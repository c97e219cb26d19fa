//! Worker Supervisor: the registry of live workers.
//!
//! At most one worker exists per [`WorkerKey`]. A slot is absent, `Starting` or `Ready`:
//!
//! - the first caller for an absent key inserts `Starting` under the registry lock and
//!   spawns the creation attempt as its own task, so a disconnecting caller never cancels
//!   it for others;
//! - callers arriving while the slot is `Starting` wait on the same attempt and receive a
//!   clone of its outcome;
//! - a successful attempt turns the slot `Ready`; a failed one removes it;
//! - the process exit event removes a `Ready` slot, guarded by a generation number so a late
//!   exit of an old worker never evicts its replacement.
mod id;
pub use id::make_worker_id;

mod slot;
use slot::{Outcome, Slot};

mod worker;
pub use worker::{WorkerHandle, WorkerInfo, WorkerState};


use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use futures_util::future::join_all;
use parking_lot::Mutex;
use relhost_model::{
    DEFAULT_READY_TIMEOUT_MS, DEFAULT_SOCKET_ENV, Env, ReleaseIdentity, WorkerKey,
};
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::{
    cache::ReleaseCache,
    environment::{ResolveError, ResolverHandle},
    error::SupervisorError,
    launcher::{ExitInfo, LaunchSpec, LaunchedWorker, LauncherHandle},
    metrics::{EvictReason, MetricsHandle},
};

/// Default bound for one environment resolution.
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Supervisor settings.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Time a spawned worker has to signal readiness.
    pub ready_timeout: Duration,
    pub resolve_timeout: Duration,
    /// Variables every worker starts with; resolved variables override them.
    pub base_env: Env,
    /// Host-level variables applied over the resolved ones.
    pub extra_env: Env,
    /// Variable carrying the socket path to the worker.
    pub socket_env: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_millis(DEFAULT_READY_TIMEOUT_MS),
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
            base_env: [("NODE_ENV", "production")].into_iter().collect(),
            extra_env: Env::new(),
            socket_env: DEFAULT_SOCKET_ENV.to_string(),
        }
    }
}

/// Owner of every worker process of the host. Cheap to clone.
#[derive(Clone)]
pub struct WorkerSupervisor {
    inner: Arc<Inner>,
}

struct Inner {
    slots: Mutex<HashMap<WorkerKey, Slot>>,
    next_generation: AtomicU64,
    shutdown: CancellationToken,
    cfg: SupervisorConfig,
    cache: ReleaseCache,
    resolver: ResolverHandle,
    launcher: LauncherHandle,
    metrics: MetricsHandle,
}

impl WorkerSupervisor {
    pub fn new(
        cfg: SupervisorConfig,
        cache: ReleaseCache,
        resolver: ResolverHandle,
        launcher: LauncherHandle,
        metrics: MetricsHandle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                slots: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
                shutdown: CancellationToken::new(),
                cfg,
                cache,
                resolver,
                launcher,
                metrics,
            }),
        }
    }

    pub fn metrics(&self) -> &MetricsHandle {
        &self.inner.metrics
    }

    /// Return the ready worker for `identity`, creating it if needed.
    ///
    /// Concurrent calls for the same release collapse into one creation attempt.
    #[instrument(
        level = "debug",
        skip(self, identity),
        fields(app = %identity.application_id(), release = %identity.release_id())
    )]
    pub async fn get_or_create(
        &self,
        identity: &ReleaseIdentity,
    ) -> Result<Arc<WorkerHandle>, SupervisorError> {
        let key = identity.worker_key();

        let mut done = {
            let mut slots = self.inner.slots.lock();
            let joined = match slots.get(&key) {
                Some(slot) if slot.release_id() != identity.release_id() => {
                    warn!(key = %key, existing = %slot.release_id(), "release key collision in registry");
                    return Err(SupervisorError::KeyCollision {
                        key: key.to_string(),
                        existing: slot.release_id().to_string(),
                        requested: identity.release_id().to_string(),
                    });
                }
                Some(Slot::Ready(handle)) if handle.is_alive() => {
                    trace!(worker = %handle.id(), "registry hit");
                    return Ok(Arc::clone(handle));
                }
                Some(Slot::Starting { done, .. }) => {
                    debug!("joining in-flight start");
                    Some(done.clone())
                }
                // Exited but not yet evicted, or absent.
                _ => None,
            };
            match joined {
                Some(done) => done,
                None => self.inner.start_locked(&mut slots, identity, key)?,
            }
        };

        let outcome = match done.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| {
            Err(SupervisorError::Internal(
                "worker start finished without an outcome".to_string(),
            ))
        })
    }

    /// Ready worker for `key`, without starting one.
    pub fn get(&self, key: &WorkerKey) -> Option<Arc<WorkerHandle>> {
        match self.inner.slots.lock().get(key) {
            Some(Slot::Ready(handle)) if handle.is_alive() => Some(Arc::clone(handle)),
            _ => None,
        }
    }

    /// Evict the ready worker for `key` and ask its process to stop.
    ///
    /// Returns `false` when no ready worker exists. A worker that is still starting is left
    /// alone.
    pub fn terminate(&self, key: &WorkerKey) -> bool {
        let handle = {
            let mut slots = self.inner.slots.lock();
            match slots.get(key) {
                Some(Slot::Ready(_)) => match slots.remove(key) {
                    Some(Slot::Ready(handle)) => handle,
                    _ => return false,
                },
                _ => return false,
            }
        };
        info!(worker = %handle.id(), key = %key, "terminating worker");
        handle.terminate();
        self.inner.metrics.record_worker_evicted(EvictReason::Terminated);
        true
    }

    /// Snapshot of the registry, sorted by key.
    pub fn list(&self) -> Vec<WorkerInfo> {
        let slots = self.inner.slots.lock();
        let mut out: Vec<WorkerInfo> = slots
            .iter()
            .map(|(key, slot)| {
                let mut info = WorkerInfo {
                    key: key.to_string(),
                    application_id: key.application_id().to_string(),
                    release_key: key.release_key().to_string(),
                    release_id: slot.release_id().to_string(),
                    state: WorkerState::Starting,
                    worker_id: None,
                    pid: None,
                    uptime_ms: None,
                };
                if let Slot::Ready(handle) = slot {
                    info.state = WorkerState::Ready;
                    info.worker_id = Some(handle.id().to_string());
                    info.pid = handle.pid();
                    info.uptime_ms = Some(handle.uptime().as_millis() as u64);
                }
                info
            })
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    /// Refuse new starts, stop every worker and wait until all of them exited.
    pub async fn shutdown(&self) {
        let (ready, starting) = {
            let mut slots = self.inner.slots.lock();
            self.inner.shutdown.cancel();
            let mut ready = Vec::new();
            let mut starting = Vec::new();
            for (_, slot) in slots.drain() {
                match slot {
                    Slot::Ready(handle) => ready.push(handle),
                    Slot::Starting { done, .. } => starting.push(done),
                }
            }
            (ready, starting)
        };
        info!(
            ready = ready.len(),
            starting = starting.len(),
            "stopping workers"
        );

        for handle in &ready {
            handle.terminate();
            self.inner.metrics.record_worker_evicted(EvictReason::Shutdown);
        }
        for mut done in starting {
            let _ = done.wait_for(Option::is_some).await;
        }
        join_all(ready.iter().map(|h| h.wait_exit())).await;
        info!("all workers stopped");
    }
}

impl Inner {
    fn start_locked(
        self: &Arc<Self>,
        slots: &mut HashMap<WorkerKey, Slot>,
        identity: &ReleaseIdentity,
        key: WorkerKey,
    ) -> Result<watch::Receiver<Option<Outcome>>, SupervisorError> {
        if self.shutdown.is_cancelled() {
            return Err(SupervisorError::ShuttingDown);
        }
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);
        slots.insert(
            key.clone(),
            Slot::Starting {
                generation,
                release_id: identity.release_id().to_string(),
                done: rx.clone(),
            },
        );

        let inner = Arc::clone(self);
        let identity = identity.clone();
        tokio::spawn(async move {
            inner.run_start(identity, key, generation, tx).await;
        });
        Ok(rx)
    }

    #[instrument(
        name = "worker_start",
        level = "info",
        skip_all,
        fields(key = %key, release = %identity.release_id(), generation = generation)
    )]
    async fn run_start(
        self: Arc<Self>,
        identity: ReleaseIdentity,
        key: WorkerKey,
        generation: u64,
        tx: watch::Sender<Option<Outcome>>,
    ) {
        let started = Instant::now();
        let result = tokio::select! {
            res = self.create(&identity, &key, generation) => res,
            _ = self.shutdown.cancelled() => Err(SupervisorError::ShuttingDown),
        };

        let outcome = match result {
            Ok((handle, exit)) => self.publish(handle, exit, started),
            Err(e) => {
                self.abandon(&key, generation);
                Err(e)
            }
        };
        if let Err(e) = &outcome {
            warn!(kind = e.detail(), error = %e, "worker start failed");
            self.metrics.record_startup_failure(e.detail());
        }
        let _ = tx.send(Some(outcome));
    }

    /// Fetch, resolve, spawn and wait for readiness.
    async fn create(
        &self,
        identity: &ReleaseIdentity,
        key: &WorkerKey,
        generation: u64,
    ) -> Result<(Arc<WorkerHandle>, oneshot::Receiver<ExitInfo>), SupervisorError> {
        let release = self.cache.ensure(identity).await?;
        self.metrics.record_cache_lookup(release.outcome);

        let resolved = tokio::time::timeout(
            self.cfg.resolve_timeout,
            self.resolver
                .resolve(identity.organization_id(), identity.application_id()),
        )
        .await
        .map_err(|_| {
            ResolveError::Unreachable(format!(
                "no answer within {:?}",
                self.cfg.resolve_timeout
            ))
        })??;

        let socket_path = self.cache.socket_path(key);
        self.cache
            .clear_socket(key)
            .await
            .map_err(|e| SupervisorError::Spawn(format!("cannot clear stale socket: {e}")))?;

        let mut env = self
            .cfg
            .base_env
            .overlay(&resolved)
            .overlay(&self.cfg.extra_env);
        env.push(self.cfg.socket_env.clone(), socket_path.to_string_lossy());

        let spec = LaunchSpec {
            worker_id: make_worker_id(self.launcher.name(), key),
            key: key.clone(),
            release_id: identity.release_id().to_string(),
            workdir: release.dir,
            socket_path,
            env,
        };
        let LaunchedWorker {
            pid,
            ready,
            mut exit,
            terminate,
        } = self
            .launcher
            .launch(&spec)
            .await
            .map_err(|e| SupervisorError::Spawn(e.to_string()))?;
        debug!(worker = %spec.worker_id, pid, "worker spawned, waiting for readiness");

        // Stops the process if readiness fails or this future is dropped.
        let guard = terminate.clone().drop_guard();
        await_ready(ready, &mut exit, self.cfg.ready_timeout).await?;
        guard.disarm();

        let handle = Arc::new(WorkerHandle::new(spec, pid, generation, terminate));
        Ok((handle, exit))
    }

    /// Turn the `Starting` slot `Ready` and start watching for exit.
    fn publish(
        self: &Arc<Self>,
        handle: Arc<WorkerHandle>,
        exit: oneshot::Receiver<ExitInfo>,
        started: Instant,
    ) -> Outcome {
        self.watch_exit(Arc::clone(&handle), exit);

        let published = {
            let mut slots = self.slots.lock();
            match slots.get(handle.key()) {
                Some(Slot::Starting { generation, .. }) if *generation == handle.generation() => {
                    slots.insert(handle.key().clone(), Slot::Ready(Arc::clone(&handle)));
                    true
                }
                _ => false,
            }
        };
        if !published {
            handle.terminate();
            return Err(if self.shutdown.is_cancelled() {
                SupervisorError::ShuttingDown
            } else {
                SupervisorError::Cancelled
            });
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.metrics.record_worker_spawned(self.launcher.name());
        self.metrics.record_startup_duration(elapsed_ms);
        info!(
            worker = %handle.id(),
            pid = handle.pid(),
            elapsed_ms,
            "worker ready"
        );
        Ok(handle)
    }

    /// Drop the `Starting` slot of a failed attempt.
    fn abandon(&self, key: &WorkerKey, generation: u64) {
        let mut slots = self.slots.lock();
        if matches!(slots.get(key), Some(Slot::Starting { generation: g, .. }) if *g == generation)
        {
            slots.remove(key);
        }
    }

    fn watch_exit(self: &Arc<Self>, handle: Arc<WorkerHandle>, exit: oneshot::Receiver<ExitInfo>) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let info = exit.await.ok();
            handle.mark_exited(info);

            let evicted = {
                let mut slots = inner.slots.lock();
                match slots.get(handle.key()) {
                    Some(slot) if slot.generation() == handle.generation() => {
                        slots.remove(handle.key());
                        true
                    }
                    _ => false,
                }
            };

            let status = info.map(|i| i.to_string());
            let status = status.as_deref().unwrap_or("unknown exit status");
            if evicted {
                warn!(worker = %handle.id(), status, "worker exited, evicted from registry");
                inner.metrics.record_worker_evicted(EvictReason::Exited);
            } else {
                debug!(worker = %handle.id(), status, "worker exited");
            }
        });
    }
}

/// Race the readiness signal against process exit and the deadline.
async fn await_ready(
    mut ready: oneshot::Receiver<()>,
    exit: &mut oneshot::Receiver<ExitInfo>,
    limit: Duration,
) -> Result<(), SupervisorError> {
    let deadline = tokio::time::sleep(limit);
    tokio::pin!(deadline);
    let mut ready_open = true;

    loop {
        tokio::select! {
            biased;
            signal = &mut ready, if ready_open => match signal {
                Ok(()) => return Ok(()),
                // Launcher gave up on readiness; wait for the exit or the deadline.
                Err(_) => ready_open = false,
            },
            status = &mut *exit => {
                let status = status.map(|s| s.to_string()).unwrap_or_else(|_| "unknown exit status".to_string());
                return Err(SupervisorError::Spawn(format!("worker exited before ready ({status})")));
            }
            _ = &mut deadline => return Err(SupervisorError::StartupTimeout(limit)),
        }
    }
}
