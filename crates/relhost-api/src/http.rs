use std::sync::Arc;

use axum::{
    Router,
    routing::{any, delete, get},
};
use relhost_core::supervisor::WorkerSupervisor;
use relhost_prometheus::PrometheusMetrics;

use crate::{admin, release, tenant};

/// Default mount point of the release routes.
pub const DEFAULT_RELEASE_PREFIX: &str = "/apps";

#[derive(Clone)]
pub(crate) struct ApiState {
    pub(crate) supervisor: WorkerSupervisor,
    pub(crate) organization_id: Arc<str>,
    pub(crate) release_prefix: Arc<str>,
    pub(crate) tenant: Option<Arc<tenant::TenantProxy>>,
    pub(crate) prometheus: Option<PrometheusMetrics>,
}

/// HTTP API service builder.
pub struct HttpApi {
    supervisor: WorkerSupervisor,
    organization_id: String,
    release_prefix: String,
    tenant: Option<tenant::TenantProxy>,
    prometheus: Option<PrometheusMetrics>,
}

impl HttpApi {
    /// Serve releases of `organization_id` through `supervisor`.
    pub fn new(supervisor: WorkerSupervisor, organization_id: impl Into<String>) -> Self {
        Self {
            supervisor,
            organization_id: organization_id.into(),
            release_prefix: DEFAULT_RELEASE_PREFIX.to_string(),
            tenant: None,
            prometheus: None,
        }
    }

    /// Mount point of the release routes; `""` mounts them at the root.
    pub fn with_release_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.release_prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_tenant_proxy(mut self, proxy: tenant::TenantProxy) -> Self {
        self.tenant = Some(proxy);
        self
    }

    /// Serve `/metrics` from this backend.
    pub fn with_prometheus(mut self, metrics: PrometheusMetrics) -> Self {
        self.prometheus = Some(metrics);
        self
    }

    /// Build axum router with mounted endpoints.
    ///
    /// Routes:
    /// - ANY {prefix}/{application_id}/{release_id}/** - forward to the release worker
    /// - GET /healthz
    /// - GET /_relhost/workers - registry snapshot
    /// - DELETE /_relhost/workers/{application_id}/{release_id} - stop a worker
    /// - GET /metrics - when a Prometheus backend is set
    /// - everything else - tenant proxy, 404 without one
    pub fn router(self) -> Router {
        let prefix = self.release_prefix;
        let base = format!("{prefix}/{{application_id}}/{{release_id}}");

        let mut router = Router::new()
            .route(&base, any(release::forward_release))
            .route(&format!("{base}/"), any(release::forward_release))
            .route(&format!("{base}/{{*rest}}"), any(release::forward_release))
            .route("/healthz", get(admin::healthz))
            .route("/_relhost/workers", get(admin::list_workers))
            .route(
                "/_relhost/workers/{application_id}/{release_id}",
                delete(admin::delete_worker),
            );
        if self.prometheus.is_some() {
            router = router.route("/metrics", get(admin::metrics));
        }

        router.fallback(tenant::tenant_fallback).with_state(ApiState {
            supervisor: self.supervisor,
            organization_id: self.organization_id.into(),
            release_prefix: prefix.into(),
            tenant: self.tenant.map(Arc::new),
            prometheus: self.prometheus,
        })
    }
}
