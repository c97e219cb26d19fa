//! Tenant proxy: pass-through of the tenant's data services behind the same front door.
//!
//! Each upstream owns a path prefix. The longest matching prefix wins, the prefix is stripped
//! and the rest of the path and the query are appended to the upstream URL. An optional
//! fallback upstream receives everything that matched nothing.
use axum::{
    Json,
    body::{Body, HttpBody},
    extract::{Request, State},
    http::{Method, header},
    response::{IntoResponse, Redirect, Response},
};
use reqwest::{Client, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::{ApiError, headers::strip_hop_by_hop, http::ApiState};

/// Admin UI endpoints answered locally with an empty list when a fallback is configured.
const FALLBACK_STUBS: [&str; 2] = [
    "/api/v1/projects/default/branches",
    "/api/v1/projects/default/api-keys",
];

#[derive(Debug, Error)]
pub enum TenantProxyError {
    #[error("invalid upstream prefix {0:?}: must start with '/'")]
    InvalidPrefix(String),

    #[error("invalid upstream url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("duplicate upstream prefix {0:?}")]
    DuplicatePrefix(String),
}

/// One prefix-mapped upstream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TenantUpstream {
    pub prefix: String,
    pub url: String,
}

/// Catch-all upstream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TenantFallback {
    pub url: String,
    /// Where `/` redirects to, e.g. `/project/default`.
    #[serde(default)]
    pub redirect_root: Option<String>,
}

#[derive(Debug)]
struct Route {
    prefix: String,
    base: String,
}

#[derive(Debug)]
pub struct TenantProxy {
    client: Client,
    routes: Vec<Route>,
    fallback: Option<(String, Option<String>)>,
}

impl TenantProxy {
    /// Build the proxy. `client` should not follow redirects so they reach the caller.
    pub fn new(
        client: Client,
        upstreams: &[TenantUpstream],
        fallback: Option<&TenantFallback>,
    ) -> Result<Self, TenantProxyError> {
        let mut routes = Vec::with_capacity(upstreams.len());
        for up in upstreams {
            if !up.prefix.starts_with('/') {
                return Err(TenantProxyError::InvalidPrefix(up.prefix.clone()));
            }
            let prefix = normalize_prefix(&up.prefix);
            if routes.iter().any(|r: &Route| r.prefix == prefix) {
                return Err(TenantProxyError::DuplicatePrefix(up.prefix.clone()));
            }
            routes.push(Route {
                prefix,
                base: base_url(&up.url)?,
            });
        }
        // Longest prefix first.
        routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));

        let fallback = match fallback {
            Some(fb) => Some((base_url(&fb.url)?, fb.redirect_root.clone())),
            None => None,
        };

        Ok(Self {
            client,
            routes,
            fallback,
        })
    }

    /// Upstream URL for `path` and `query`, or `None` if nothing serves it.
    fn target(&self, path: &str, query: Option<&str>) -> Option<String> {
        let (base, rest) = match self.routes.iter().find_map(|r| {
            strip_scope(path, &r.prefix).map(|rest| (r.base.as_str(), rest))
        }) {
            Some(found) => found,
            None => (self.fallback.as_ref()?.0.as_str(), path),
        };

        let mut url = format!("{base}{rest}");
        if let Some(query) = query {
            url.push('?');
            url.push_str(query);
        }
        Some(url)
    }

    /// Locally answered requests of the fallback upstream.
    fn local_answer(&self, method: &Method, path: &str) -> Option<Response> {
        let (_, redirect) = self.fallback.as_ref()?;
        if self.routes.iter().any(|r| strip_scope(path, &r.prefix).is_some()) {
            return None;
        }
        if path == "/" {
            return redirect.as_deref().map(|to| Redirect::temporary(to).into_response());
        }
        if *method == Method::GET && FALLBACK_STUBS.contains(&path) {
            return Some(Json(serde_json::json!([])).into_response());
        }
        None
    }

    pub(crate) async fn forward(&self, req: Request) -> Result<Response, ApiError> {
        let path = req.uri().path().to_string();
        if let Some(resp) = self.local_answer(req.method(), &path) {
            return Ok(resp);
        }
        let Some(url) = self.target(&path, req.uri().query()) else {
            return Err(ApiError::NotFound(path));
        };
        trace!(method = %req.method(), url = %url, "forwarding to tenant upstream");

        let (mut parts, body) = req.into_parts();
        parts.headers.remove(header::HOST);
        strip_hop_by_hop(&mut parts.headers);

        let mut upstream = self.client.request(parts.method, &url).headers(parts.headers);
        if body.size_hint().exact() != Some(0) {
            upstream = upstream.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }
        let resp = upstream
            .send()
            .await
            .map_err(|e| ApiError::Upstream(e.to_string()))?;
        debug!(url = %url, status = resp.status().as_u16(), "tenant upstream answered");

        let status = resp.status();
        let mut headers = resp.headers().clone();
        strip_hop_by_hop(&mut headers);
        let mut out = Response::new(Body::from_stream(resp.bytes_stream()));
        *out.status_mut() = status;
        *out.headers_mut() = headers;
        Ok(out)
    }
}

pub(crate) async fn tenant_fallback(State(state): State<ApiState>, req: Request) -> Response {
    let Some(proxy) = state.tenant.as_ref() else {
        return ApiError::NotFound(req.uri().path().to_string()).into_response();
    };
    match proxy.forward(req).await {
        Ok(resp) => resp,
        Err(e) => {
            if matches!(e, ApiError::Upstream(_)) {
                warn!(error = %e, "tenant upstream unreachable");
                state.supervisor.metrics().record_proxy_failure("upstream");
            }
            e.into_response()
        }
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() }
}

fn base_url(url: &str) -> Result<String, TenantProxyError> {
    let parsed = Url::parse(url).map_err(|e| TenantProxyError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(TenantProxyError::InvalidUrl {
            url: url.to_string(),
            reason: "scheme must be http or https".into(),
        });
    }
    Ok(url.trim_end_matches('/').to_string())
}

/// Remainder of `path` under `prefix`, always starting with `/`.
fn strip_scope<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix == "/" {
        return Some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}
