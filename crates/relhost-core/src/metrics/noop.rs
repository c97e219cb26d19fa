use crate::metrics::backend::{CacheOutcome, EvictReason, MetricsBackend};

/// Backend that drops every observation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetrics;

impl MetricsBackend for NoOpMetrics {
    #[inline(always)]
    fn record_worker_spawned(&self, _: &str) {}

    #[inline(always)]
    fn record_worker_evicted(&self, _: EvictReason) {}

    #[inline(always)]
    fn record_startup_failure(&self, _: &str) {}

    #[inline(always)]
    fn record_cache_lookup(&self, _: CacheOutcome) {}

    #[inline(always)]
    fn record_startup_duration(&self, _: u64) {}

    #[inline(always)]
    fn record_proxy_failure(&self, _: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_is_zero_sized() {
        assert_eq!(std::mem::size_of::<NoOpMetrics>(), 0);
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(EvictReason::Exited.as_label(), "exited");
        assert_eq!(EvictReason::Terminated.as_label(), "terminated");
        assert_eq!(EvictReason::Shutdown.as_label(), "shutdown");
        assert_eq!(CacheOutcome::Hit.as_label(), "hit");
        assert_eq!(CacheOutcome::Miss.as_label(), "miss");
    }
}
