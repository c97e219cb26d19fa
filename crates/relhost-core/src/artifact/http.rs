use std::io;

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use relhost_model::ObjectKey;
use reqwest::{Client, StatusCode};
use tracing::debug;

use super::{ArtifactStore, ArtifactStream, FetchError};

/// Artifact store reachable over plain HTTP GET: `{base_url}/{object_key}`.
#[derive(Debug, Clone)]
pub struct HttpArtifactStore {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpArtifactStore {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, key: &ObjectKey) -> String {
        format!("{}/{}", self.base_url, key)
    }
}

#[async_trait]
impl ArtifactStore for HttpArtifactStore {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn open(&self, key: &ObjectKey) -> Result<ArtifactStream, FetchError> {
        let url = self.url(key);
        debug!(url = %url, "requesting artifact");

        let mut req = self.client.get(&url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        match resp.status() {
            s if s.is_success() => Ok(resp
                .bytes_stream()
                .map_err(|e| io::Error::new(io::ErrorKind::ConnectionAborted, e))
                .boxed()),
            StatusCode::NOT_FOUND => Err(FetchError::NotFound(key.to_string())),
            s => Err(FetchError::Transport(format!("{url} returned {s}"))),
        }
    }
}
