//! HTTP surface of the worker host.
//!
//! - release routes: `{prefix}/{application_id}/{release_id}/**`, forwarded to the release's
//!   worker over its Unix socket;
//! - tenant proxy: everything else, passed through to fixed upstreams;
//! - admin: `/healthz`, `/_relhost/workers`, `/metrics`.
mod admin;
mod error;
pub use error::ApiError;

mod forward;
mod headers;

mod http;
pub use http::{DEFAULT_RELEASE_PREFIX, HttpApi};

mod release;

mod tenant;
pub use tenant::{TenantFallback, TenantProxy, TenantProxyError, TenantUpstream};

#[cfg(test)]
mod testing;
