//! In-process workers for router tests: each "process" is an axum server on the worker socket.
use std::{
    collections::HashMap,
    io::Write,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::IntoResponse,
    routing::{any, get},
};
use flate2::{Compression, write::GzEncoder};
use futures_util::{StreamExt, stream};
use parking_lot::Mutex;
use relhost_core::{
    artifact::{ArtifactStore, ArtifactStream, FetchError},
    cache::ReleaseCache,
    environment::StaticEnvironmentResolver,
    launcher::{ExitInfo, LaunchError, LaunchSpec, LaunchedWorker, WorkerLauncher},
    supervisor::{SupervisorConfig, WorkerSupervisor},
};
use relhost_model::{Env, ObjectKey, ReleaseIdentity, ReleaseKey, WorkerKey};
use relhost_prometheus::PrometheusMetrics;
use tempfile::TempDir;
use tokio::{net::UnixListener, sync::oneshot};
use tokio_util::sync::CancellationToken;

use crate::HttpApi;

pub(crate) const ORG: &str = "acme";

pub(crate) fn tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::fast()));
    for (path, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *data).unwrap();
    }
    let mut gz = builder.into_inner().unwrap();
    gz.flush().unwrap();
    gz.finish().unwrap()
}

#[derive(Default)]
pub(crate) struct MemStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    pub(crate) opened: AtomicUsize,
}

#[async_trait]
impl ArtifactStore for MemStore {
    fn name(&self) -> &'static str {
        "mem"
    }

    async fn open(&self, key: &ObjectKey) -> Result<ArtifactStream, FetchError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let data = self.objects.lock().get(key.as_str()).cloned();
        match data {
            Some(data) => Ok(stream::iter([Ok(Bytes::from(data))]).boxed()),
            None => Err(FetchError::NotFound(key.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum WorkerBehavior {
    /// Serve the test app on the socket.
    Serve,
    /// Report ready without ever listening.
    CloseSocket,
}

pub(crate) struct AxumLauncher {
    behavior: WorkerBehavior,
    pub(crate) launches: AtomicUsize,
    crashes: Mutex<Vec<CancellationToken>>,
}

impl AxumLauncher {
    /// Make every launched worker exit on its own.
    pub(crate) fn crash_all(&self) {
        for token in self.crashes.lock().drain(..) {
            token.cancel();
        }
    }
}

#[async_trait]
impl WorkerLauncher for AxumLauncher {
    fn name(&self) -> &'static str {
        "axum"
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<LaunchedWorker, LaunchError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        let terminate = CancellationToken::new();
        let crash = CancellationToken::new();
        self.crashes.lock().push(crash.clone());

        let stop = {
            let terminate = terminate.clone();
            async move {
                tokio::select! {
                    _ = terminate.cancelled() => {}
                    _ = crash.cancelled() => {}
                }
            }
        };

        match self.behavior {
            WorkerBehavior::Serve => {
                let listener = UnixListener::bind(&spec.socket_path)?;
                let app = worker_app(spec.env.clone());
                tokio::spawn(async move {
                    let _ = ready_tx.send(());
                    let _ = axum::serve(listener, app).with_graceful_shutdown(stop).await;
                    let _ = exit_tx.send(ExitInfo {
                        code: Some(0),
                        signal: None,
                    });
                });
            }
            WorkerBehavior::CloseSocket => {
                let _ = ready_tx.send(());
                tokio::spawn(async move {
                    stop.await;
                    let _ = exit_tx.send(ExitInfo::default());
                });
            }
        }

        Ok(LaunchedWorker {
            pid: None,
            ready: ready_rx,
            exit: exit_rx,
            terminate,
        })
    }
}

fn worker_app(env: Env) -> Router {
    Router::new()
        .route("/ping", get(|| async { "pong" }))
        .route("/echo", any(echo))
        .route("/inspect/{*rest}", get(inspect))
        .with_state(Arc::new(env))
}

async fn echo(headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let mut out = HeaderMap::new();
    for name in [header::CONTENT_TYPE.as_str(), "x-request-tag"] {
        if let Some(value) = headers.get(name) {
            out.insert(name.parse::<header::HeaderName>().unwrap(), value.clone());
        }
    }
    out.insert("x-worker", HeaderValue::from_static("echo"));
    (StatusCode::CREATED, out, body)
}

async fn inspect(State(env): State<Arc<Env>>, req: Request) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "uri": req.uri().to_string(),
        "method": req.method().as_str(),
        "db": env.get("DATABASE_URL"),
        "nodeEnv": env.get("NODE_ENV"),
    }))
}

pub(crate) struct Harness {
    dir: TempDir,
    pub(crate) store: Arc<MemStore>,
    pub(crate) launcher: Arc<AxumLauncher>,
    pub(crate) supervisor: WorkerSupervisor,
    pub(crate) metrics: PrometheusMetrics,
}

impl Harness {
    pub(crate) fn new(behavior: WorkerBehavior) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemStore::default());
        let launcher = Arc::new(AxumLauncher {
            behavior,
            launches: AtomicUsize::new(0),
            crashes: Mutex::new(Vec::new()),
        });
        let metrics = PrometheusMetrics::new().unwrap();
        let resolver = StaticEnvironmentResolver::new(
            [("DATABASE_URL", "postgres://db")].into_iter().collect(),
        );

        let supervisor = WorkerSupervisor::new(
            SupervisorConfig {
                ready_timeout: Duration::from_secs(2),
                ..Default::default()
            },
            ReleaseCache::new(dir.path(), store.clone()),
            Arc::new(resolver),
            launcher.clone(),
            Arc::new(metrics.clone()),
        );

        Self {
            dir,
            store,
            launcher,
            supervisor,
            metrics,
        }
    }

    pub(crate) fn publish(&self, app: &str, release: &str) {
        let identity = ReleaseIdentity::new(ORG, app, release).unwrap();
        self.store.objects.lock().insert(
            identity.object_key().to_string(),
            tar_gz(&[("index.js", b"serve()")]),
        );
    }

    pub(crate) fn release_dir(&self, app: &str, release: &str) -> PathBuf {
        let key = WorkerKey::new(app, ReleaseKey::derive(release));
        self.dir.path().join("releases").join(key.to_string())
    }

    pub(crate) fn router(&self) -> Router {
        HttpApi::new(self.supervisor.clone(), ORG)
            .with_prometheus(self.metrics.clone())
            .router()
    }

    pub(crate) async fn wait_until_empty(&self) {
        for _ in 0..200 {
            if self.supervisor.list().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("registry still holds {:?}", self.supervisor.list());
    }
}
