//! Prometheus backend for the worker host metrics.
//!
//! [`PrometheusMetrics`] implements [`relhost_core::metrics::MetricsBackend`]; the HTTP layer
//! serves [`PrometheusMetrics::encode`] on `/metrics`.
//!
//! ## Metrics
//! - `relhost_workers_spawned_total{launcher}` - Counter
//! - `relhost_workers_evicted_total{reason}` - Counter
//! - `relhost_startup_failures_total{kind}` - Counter
//! - `relhost_cache_lookups_total{outcome}` - Counter
//! - `relhost_startup_duration_seconds` - Histogram
//! - `relhost_proxy_failures_total{kind}` - Counter
mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};
