//! Component construction from a validated [`HostConfig`].
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use reqwest::{Client, redirect};
use tracing::info;

use relhost_api::{HttpApi, TenantProxy};
use relhost_core::{
    artifact::{ArtifactStoreHandle, ExtractOptions, FsArtifactStore, HttpArtifactStore},
    cache::ReleaseCache,
    environment::{HttpEnvironmentResolver, ResolverHandle, StaticEnvironmentResolver},
    metrics::{MetricsHandle, noop_metrics},
    supervisor::{SupervisorConfig, WorkerSupervisor},
};
use relhost_exec::{ProcessLauncher, ProcessLauncherConfig};
use relhost_model::Env;
use relhost_prometheus::PrometheusMetrics;

use crate::config::{HostConfig, ResolverKind, StoreKind};

const USER_AGENT: &str = concat!("relhost/", env!("CARGO_PKG_VERSION"));

pub struct Host {
    pub supervisor: WorkerSupervisor,
    pub router: Router,
}

pub async fn build(cfg: &HostConfig) -> anyhow::Result<Host> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .context("building http client")?;

    let cache = ReleaseCache::new(&cfg.host.data_dir, artifact_store(cfg, &client)?)
        .with_extract_options(ExtractOptions {
            strip_components: cfg.artifacts.strip_components,
            entrypoint: cfg.artifacts.entrypoint.clone(),
        })
        .with_fetch_timeout(cfg.fetch_timeout());
    cache
        .prepare()
        .await
        .with_context(|| format!("preparing data dir {}", cfg.host.data_dir.display()))?;

    let launcher = ProcessLauncher::new(ProcessLauncherConfig {
        program: cfg.worker.program.clone(),
        args: cfg.worker.args.clone(),
        ready_marker: cfg.worker.ready_marker.clone(),
        terminate_grace: cfg.terminate_grace(),
        inherit_env: cfg.worker.inherit_env,
        output: cfg.worker.output,
        rlimits: cfg.worker.rlimits.clone(),
    })
    .context("worker launcher")?;

    let prometheus = if cfg.metrics.enabled {
        Some(PrometheusMetrics::new().context("registering metrics")?)
    } else {
        None
    };
    let metrics: MetricsHandle = match &prometheus {
        Some(prom) => Arc::new(prom.clone()),
        None => noop_metrics(),
    };

    let supervisor = WorkerSupervisor::new(
        SupervisorConfig {
            ready_timeout: cfg.ready_timeout(),
            resolve_timeout: cfg.resolve_timeout(),
            extra_env: Env::from(cfg.worker.extra_env.clone()),
            socket_env: cfg.worker.socket_env.clone(),
            ..SupervisorConfig::default()
        },
        cache,
        resolver(cfg, &client),
        Arc::new(launcher),
        metrics,
    );

    let mut api = HttpApi::new(supervisor.clone(), cfg.host.organization_id.clone())
        .with_release_prefix(cfg.server.release_prefix.clone());
    if !cfg.tenant.is_empty() {
        // Redirects from tenant services go back to the browser untouched.
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect::Policy::none())
            .build()
            .context("building tenant proxy client")?;
        let proxy = TenantProxy::new(client, &cfg.tenant.upstreams, cfg.tenant.fallback.as_ref())
            .context("tenant proxy")?;
        api = api.with_tenant_proxy(proxy);
    }
    if let Some(prom) = prometheus {
        api = api.with_prometheus(prom);
    }

    info!(
        organization = %cfg.host.organization_id,
        data_dir = %cfg.host.data_dir.display(),
        program = %cfg.worker.program,
        tenant_upstreams = cfg.tenant.upstreams.len(),
        metrics = cfg.metrics.enabled,
        "host components ready"
    );
    Ok(Host {
        supervisor,
        router: api.router(),
    })
}

fn artifact_store(cfg: &HostConfig, client: &Client) -> anyhow::Result<ArtifactStoreHandle> {
    let a = &cfg.artifacts;
    Ok(match a.kind {
        StoreKind::Http => {
            let base = a.base_url.clone().context("artifacts.base_url is required")?;
            let mut store = HttpArtifactStore::new(client.clone(), base);
            if let Some(token) = &a.token {
                store = store.with_token(token.clone());
            }
            Arc::new(store)
        }
        StoreKind::Fs => {
            let root = a.root.clone().context("artifacts.root is required")?;
            Arc::new(FsArtifactStore::new(root))
        }
    })
}

fn resolver(cfg: &HostConfig, client: &Client) -> ResolverHandle {
    let e = &cfg.environment;
    match (e.kind, &e.url) {
        (ResolverKind::Http, Some(url)) => {
            let mut resolver = HttpEnvironmentResolver::new(client.clone(), url.clone());
            if let Some(token) = &e.token {
                resolver = resolver.with_token(token.clone());
            }
            Arc::new(resolver)
        }
        _ => Arc::new(StaticEnvironmentResolver::new(Env::from(e.vars.clone()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_router_from_local_config() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = HostConfig::parse(&format!(
            r#"
            [host]
            organization_id = "acme"
            data_dir = "{data}"

            [artifacts]
            kind = "fs"
            root = "{store}"

            [environment]
            kind = "static"

            [[tenant.upstreams]]
            prefix = "/rest/v1"
            url = "http://127.0.0.1:3000"
            "#,
            data = dir.path().join("data").display(),
            store = dir.path().join("store").display(),
        ))
        .unwrap();
        cfg.validate().unwrap();

        let host = build(&cfg).await.unwrap();
        assert!(host.supervisor.list().is_empty());
        assert!(dir.path().join("data/releases").is_dir());
        assert!(dir.path().join("data/sockets").is_dir());
    }
}
