use std::sync::Arc;

/// Why a worker left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictReason {
    /// The process exited on its own (crash or normal exit).
    Exited,
    /// Explicit terminate request.
    Terminated,
    /// Host shutdown.
    Shutdown,
}

impl EvictReason {
    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            EvictReason::Exited => "exited",
            EvictReason::Terminated => "terminated",
            EvictReason::Shutdown => "shutdown",
        }
    }
}

/// Result of a release cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
}

impl CacheOutcome {
    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            CacheOutcome::Hit => "hit",
            CacheOutcome::Miss => "miss",
        }
    }
}

/// Metrics collection interface.
pub trait MetricsBackend: Send + Sync + 'static {
    /// A worker became ready.
    fn record_worker_spawned(&self, launcher: &str);

    /// A worker left the registry.
    fn record_worker_evicted(&self, reason: EvictReason);

    /// A creation attempt failed; `kind` is [`crate::error::SupervisorError::detail`].
    fn record_startup_failure(&self, kind: &str);

    fn record_cache_lookup(&self, outcome: CacheOutcome);

    /// Time from the start of a creation attempt until readiness.
    fn record_startup_duration(&self, duration_ms: u64);

    /// A proxied request failed before a response could be relayed.
    fn record_proxy_failure(&self, kind: &str);
}

/// Shared handle to a metrics backend.
pub type MetricsHandle = Arc<dyn MetricsBackend>;
