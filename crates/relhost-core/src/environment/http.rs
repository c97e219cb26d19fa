use async_trait::async_trait;
use relhost_model::Env;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::{EnvironmentResolver, ResolveError};

/// Longest response excerpt carried in a [`ResolveError::Rejected`] message.
const MAX_ERROR_BODY: usize = 512;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolveRequest<'a> {
    organization_id: &'a str,
    application_id: &'a str,
}

/// Resolver calling the control plane: `POST {url}` with `{organizationId, applicationId}`.
///
/// The response body is a flat JSON object of string values.
#[derive(Debug, Clone)]
pub struct HttpEnvironmentResolver {
    client: Client,
    url: String,
    token: Option<String>,
}

impl HttpEnvironmentResolver {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

#[async_trait]
impl EnvironmentResolver for HttpEnvironmentResolver {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn resolve(
        &self,
        organization_id: &str,
        application_id: &str,
    ) -> Result<Env, ResolveError> {
        let mut req = self.client.post(&self.url).json(&ResolveRequest {
            organization_id,
            application_id,
        });
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ResolveError::Unreachable(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| ResolveError::Unreachable(e.to_string()))?;

        if !status.is_success() {
            let mut message = String::from_utf8_lossy(&body).into_owned();
            if message.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !message.is_char_boundary(cut) {
                    cut -= 1;
                }
                message.truncate(cut);
            }
            return Err(ResolveError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let env: Env = serde_json::from_slice(&body).map_err(|e| ResolveError::Rejected {
            status: status.as_u16(),
            message: format!("invalid environment payload: {e}"),
        })?;
        debug!(vars = env.len(), "environment resolved");
        Ok(env)
    }
}
