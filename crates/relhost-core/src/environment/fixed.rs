use async_trait::async_trait;
use relhost_model::Env;

use super::{EnvironmentResolver, ResolveError};

/// Resolver returning the same variables for every application.
///
/// For hosts without a control plane and for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticEnvironmentResolver {
    env: Env,
}

impl StaticEnvironmentResolver {
    pub fn new(env: Env) -> Self {
        Self { env }
    }
}

#[async_trait]
impl EnvironmentResolver for StaticEnvironmentResolver {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn resolve(&self, _: &str, _: &str) -> Result<Env, ResolveError> {
        Ok(self.env.clone())
    }
}
