//! Release routes: start or find the worker of a release and forward the request to it.
use axum::{
    extract::{Path, Request, State},
    http::Uri,
    response::Response,
};
use relhost_model::ReleaseIdentity;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::{ApiError, forward, http::ApiState};

#[derive(Debug, Deserialize)]
pub(crate) struct ReleasePath {
    application_id: String,
    release_id: String,
}

#[instrument(
    level = "debug",
    skip(state, req),
    fields(app = %path.application_id, release = %path.release_id)
)]
pub(crate) async fn forward_release(
    State(state): State<ApiState>,
    Path(path): Path<ReleasePath>,
    req: Request,
) -> Result<Response, ApiError> {
    let identity = ReleaseIdentity::new(
        state.organization_id.as_ref(),
        path.application_id,
        path.release_id,
    )
    .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
    let target = forwarded_path(req.uri(), &state.release_prefix);

    let worker = state.supervisor.get_or_create(&identity).await?;
    debug!(worker = %worker.id(), target = %target, "forwarding request");

    match forward::send(worker.socket_path(), req, &target).await {
        Ok(resp) => Ok(resp),
        Err(e) => {
            warn!(worker = %worker.id(), kind = e.kind(), error = %e, "worker unreachable");
            state.supervisor.metrics().record_proxy_failure("worker_unavailable");
            Err(ApiError::WorkerUnavailable(e.to_string()))
        }
    }
}

/// Path and query as the worker sees them: `{prefix}/{app}/{release}` removed, the rest kept.
fn forwarded_path(uri: &Uri, prefix: &str) -> String {
    let path = uri.path();
    let scoped = path.strip_prefix(prefix).unwrap_or(path);

    let mut segments = scoped.splitn(4, '/');
    // "", application id, release id
    segments.nth(2);
    let rest = match segments.next() {
        Some(rest) => format!("/{rest}"),
        None => "/".to_string(),
    };
    match uri.query() {
        Some(query) => format!("{rest}?{query}"),
        None => rest,
    }
}
