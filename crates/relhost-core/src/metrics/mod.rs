//! Metrics seam for the worker host.
//!
//! Backends implement [`MetricsBackend`] and are handed to the supervisor and the HTTP layer
//! as a shared [`MetricsHandle`]. Label values are bounded; application ids never become labels.
mod backend;
pub use backend::{CacheOutcome, EvictReason, MetricsBackend, MetricsHandle};

mod noop;
pub use noop::NoOpMetrics;

use std::sync::Arc;

/// Create a no-op metrics handle.
#[inline]
pub fn noop_metrics() -> MetricsHandle {
    Arc::new(NoOpMetrics)
}
