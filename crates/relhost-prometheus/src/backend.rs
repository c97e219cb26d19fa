use std::sync::Arc;

use prometheus::{
    CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
    proto::MetricFamily,
};

use relhost_core::metrics::{CacheOutcome, EvictReason, MetricsBackend};

const NAMESPACE: &str = "relhost";

/// Prometheus metrics backend.
///
/// All labels are bounded: launcher names, eviction reasons, error kinds and cache outcomes.
/// Application and release ids are never used as label values.
#[derive(Clone)]
pub struct PrometheusMetrics {
    workers_spawned: CounterVec,
    workers_evicted: CounterVec,
    startup_failures: CounterVec,
    cache_lookups: CounterVec,
    startup_duration: Histogram,
    proxy_failures: CounterVec,
    registry: Arc<Registry>,
}

impl PrometheusMetrics {
    /// Create a backend registering into `registry`.
    pub fn new_with_registry(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        let workers_spawned = counter(
            &registry,
            "workers_spawned_total",
            "Workers that became ready",
            "launcher",
        )?;
        let workers_evicted = counter(
            &registry,
            "workers_evicted_total",
            "Workers removed from the registry",
            "reason",
        )?;
        let startup_failures = counter(
            &registry,
            "startup_failures_total",
            "Failed worker creation attempts",
            "kind",
        )?;
        let cache_lookups = counter(
            &registry,
            "cache_lookups_total",
            "Release cache lookups",
            "outcome",
        )?;
        let proxy_failures = counter(
            &registry,
            "proxy_failures_total",
            "Proxied requests that failed before a response was relayed",
            "kind",
        )?;

        let startup_duration = Histogram::with_opts(
            HistogramOpts::new(
                "startup_duration_seconds",
                "Time from creation start until the worker is ready",
            )
            .namespace(NAMESPACE)
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 120.0]),
        )?;
        registry.register(Box::new(startup_duration.clone()))?;

        Ok(Self {
            workers_spawned,
            workers_evicted,
            startup_failures,
            cache_lookups,
            startup_duration,
            proxy_failures,
            registry,
        })
    }

    /// Create a backend with its own registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::new_with_registry(Arc::new(Registry::new()))
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Text exposition of every registered metric, with its content type.
    pub fn encode(&self) -> Result<(String, Vec<u8>), prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&self.gather(), &mut buf)?;
        Ok((encoder.format_type().to_string(), buf))
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

fn counter(
    registry: &Registry,
    name: &str,
    help: &str,
    label: &str,
) -> Result<CounterVec, prometheus::Error> {
    let vec = CounterVec::new(Opts::new(name, help).namespace(NAMESPACE), &[label])?;
    registry.register(Box::new(vec.clone()))?;
    Ok(vec)
}

impl MetricsBackend for PrometheusMetrics {
    fn record_worker_spawned(&self, launcher: &str) {
        self.workers_spawned.with_label_values(&[launcher]).inc();
    }

    fn record_worker_evicted(&self, reason: EvictReason) {
        self.workers_evicted
            .with_label_values(&[reason.as_label()])
            .inc();
    }

    fn record_startup_failure(&self, kind: &str) {
        self.startup_failures.with_label_values(&[kind]).inc();
    }

    fn record_cache_lookup(&self, outcome: CacheOutcome) {
        self.cache_lookups
            .with_label_values(&[outcome.as_label()])
            .inc();
    }

    fn record_startup_duration(&self, duration_ms: u64) {
        self.startup_duration.observe(duration_ms as f64 / 1000.0);
    }

    fn record_proxy_failure(&self, kind: &str) {
        self.proxy_failures.with_label_values(&[kind]).inc();
    }
}
