use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use relhost_core::supervisor::WorkerInfo;
use relhost_model::ReleaseIdentity;
use serde::Serialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::info;

use crate::{ApiError, http::ApiState};

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    message: &'static str,
    timestamp: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ListWorkersResponse {
    workers: Vec<WorkerInfo>,
}

/// GET /healthz
pub(crate) async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        message: "ok",
        timestamp: OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default(),
    })
}

/// GET /_relhost/workers
pub(crate) async fn list_workers(State(state): State<ApiState>) -> Json<ListWorkersResponse> {
    Json(ListWorkersResponse {
        workers: state.supervisor.list(),
    })
}

/// DELETE /_relhost/workers/{application_id}/{release_id}
pub(crate) async fn delete_worker(
    State(state): State<ApiState>,
    Path((application_id, release_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let identity = ReleaseIdentity::new(state.organization_id.as_ref(), application_id, release_id)
        .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
    let key = identity.worker_key();

    let owned = state
        .supervisor
        .get(&key)
        .is_some_and(|w| w.release_id() == identity.release_id());
    if owned && state.supervisor.terminate(&key) {
        info!(key = %key, "worker terminated on request");
        return Ok(StatusCode::NO_CONTENT);
    }
    Err(ApiError::NotFound(format!("no running worker for {key}")))
}

/// GET /metrics
pub(crate) async fn metrics(State(state): State<ApiState>) -> Result<Response, ApiError> {
    let Some(exporter) = state.prometheus.as_ref() else {
        return Err(ApiError::NotFound("/metrics".into()));
    };
    let (content_type, body) = exporter
        .encode()
        .map_err(|e| ApiError::Internal(format!("metrics encoding failed: {e}")))?;
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}
