use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use relhost_core::error::SupervisorError;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure of an HTTP request handled by the host.
///
/// Server-side failures are logged with their kind and answered with a fixed message so
/// internal topology never reaches the client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    /// Transport failure talking to a worker that was ready.
    #[error("worker unavailable: {0}")]
    WorkerUnavailable(String),

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::Supervisor(e) => e.kind(),
            ApiError::WorkerUnavailable(_) => "worker_unavailable",
            ApiError::Upstream(_) => "upstream",
            ApiError::NotFound(_) => "not_found",
            ApiError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Supervisor(SupervisorError::ShuttingDown) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Supervisor(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::WorkerUnavailable(_) | ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::InvalidRequest(msg) => msg.clone(),
            ApiError::NotFound(_) => "not found".to_string(),
            ApiError::Supervisor(SupervisorError::ShuttingDown) => {
                "service is shutting down".to_string()
            }
            ApiError::WorkerUnavailable(_) | ApiError::Upstream(_) => "bad gateway".to_string(),
            ApiError::Supervisor(_) | ApiError::Internal(_) => "internal server error".to_string(),
        };

        if status.is_server_error() {
            let detail = match &self {
                ApiError::Supervisor(e) => e.detail(),
                other => other.kind(),
            };
            warn!(kind = self.kind(), detail, error = %self, "request failed");
        } else {
            debug!(kind = self.kind(), error = %self, "request rejected");
        }

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::to_bytes;
    use relhost_core::artifact::FetchError;

    use super::*;

    async fn body_of(err: ApiError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn supervisor_errors_are_generic_500s() {
        let err: ApiError = SupervisorError::Fetch(FetchError::NotFound(
            "builds/acme/shop/r1/artifact.tar.gz".into(),
        ))
        .into();
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "internal server error");

        let err: ApiError = SupervisorError::StartupTimeout(Duration::from_secs(5)).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.kind(), "startup_timeout");
    }

    #[tokio::test]
    async fn client_errors_keep_their_message() {
        let (status, body) = body_of(ApiError::InvalidRequest("bad release id".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad release id");

        let (status, _) = body_of(ApiError::WorkerUnavailable("connection refused".into())).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let err: ApiError = SupervisorError::ShuttingDown.into();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
