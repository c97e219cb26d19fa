//! Environment Resolver: per-application variables from the control plane.
mod error;
pub use error::ResolveError;

mod fixed;
pub use fixed::StaticEnvironmentResolver;

mod http;
pub use http::HttpEnvironmentResolver;

use std::sync::Arc;

use async_trait::async_trait;
use relhost_model::Env;

/// Source of the environment bound to a worker at spawn time.
///
/// Called once per creation attempt; implementations do not cache.
#[async_trait]
pub trait EnvironmentResolver: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve(&self, organization_id: &str, application_id: &str)
    -> Result<Env, ResolveError>;
}

/// Shared handle to an environment resolver.
pub type ResolverHandle = Arc<dyn EnvironmentResolver>;
