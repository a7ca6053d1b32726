use crate::api::cluster::Cluster;
use crate::util::errors::Error;
use kube::ResourceExt;
use prometheus::{histogram_opts, opts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Registry};
use tokio::time::Instant;

/// Prometheus metrics registered under the `cluster_controller` namespace.
#[derive(Clone)]
pub struct Metrics {
    pub reconciliations: IntCounter,
    pub failures: IntCounterVec,
    pub reconcile_duration: HistogramVec,
    pub health_checks: IntCounterVec,
    pub rate_limiter_usage: IntGauge,
}

impl Default for Metrics {
    fn default() -> Self {
        let reconcile_duration = HistogramVec::new(
            histogram_opts!(
                "cluster_controller_reconcile_duration_seconds",
                "The time a reconcile call took to complete, in seconds",
            )
            .buckets(vec![0.01, 0.1, 0.25, 0.5, 1., 5., 15., 60.]),
            &["instance"],
        )
        .unwrap();
        let failures = IntCounterVec::new(
            opts!(
                "cluster_controller_reconciliation_errors_total",
                "reconciliation errors, labeled by cluster and error kind",
            ),
            &["instance", "error"],
        )
        .unwrap();
        let reconciliations = IntCounter::new(
            "cluster_controller_reconciliations_total",
            "total cluster reconciliations attempted",
        )
        .unwrap();
        let health_checks = IntCounterVec::new(
            opts!(
                "cluster_controller_health_checks_total",
                "health check outcomes, labeled by cluster and result",
            ),
            &["instance", "result"],
        )
        .unwrap();
        let rate_limiter_usage = IntGauge::new(
            "cluster_controller_client_rate_limiter_tokens_in_use",
            "tokens currently checked out of the client's rate limiter",
        )
        .unwrap();
        Metrics {
            reconciliations,
            failures,
            reconcile_duration,
            health_checks,
            rate_limiter_usage,
        }
    }
}

impl Metrics {
    /// Register all metrics with `registry`. Must be called exactly once per registry.
    pub fn register(self, registry: &Registry) -> Result<Self, prometheus::Error> {
        registry.register(Box::new(self.reconcile_duration.clone()))?;
        registry.register(Box::new(self.failures.clone()))?;
        registry.register(Box::new(self.reconciliations.clone()))?;
        registry.register(Box::new(self.health_checks.clone()))?;
        registry.register(Box::new(self.rate_limiter_usage.clone()))?;
        Ok(self)
    }

    pub fn reconcile_failure(&self, cluster: &Cluster, e: &Error) {
        self.failures
            .with_label_values(&[cluster.name_any().as_ref(), e.metric_label().as_ref()])
            .inc();
    }

    pub fn health_check_outcome(&self, cluster_name: &str, healthy: bool) {
        let result = if healthy { "healthy" } else { "unhealthy" };
        self.health_checks.with_label_values(&[cluster_name, result]).inc();
    }

    pub fn count_and_measure(&self) -> ReconcileMeasurer {
        self.reconciliations.inc();
        ReconcileMeasurer {
            start: Instant::now(),
            metric: self.reconcile_duration.clone(),
            instance: "cluster".to_string(),
        }
    }
}

/// Duration measurer: relies on `Drop` to record the observation, so callers just let
/// the guard fall out of scope at the end of a reconcile.
pub struct ReconcileMeasurer {
    start: Instant,
    metric: HistogramVec,
    instance: String,
}

impl Drop for ReconcileMeasurer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_millis() as f64 / 1000.0;
        self.metric.with_label_values(&[self.instance.as_str()]).observe(duration);
    }
}
