//! Prometheus metrics infrastructure
//!
//! This module installs the Prometheus exporter and defines the metric sets
//! used by the HTTP server and the write-lock coordinator.
//!
//! Handles are looked up through the `metrics` macros on every record call
//! rather than cached at construction, so components built before
//! [`init_metrics`] still report once the exporter is installed.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Metric names exported by Storefront
pub mod names {
    pub const LOCK_ACQUISITIONS: &str = "datastore_lock_acquisitions_total";
    pub const LOCK_ACQUIRE_DURATION: &str = "datastore_lock_acquire_duration_seconds";
    pub const LOCK_CAS_CONFLICTS: &str = "datastore_lock_cas_conflicts_total";
    pub const LOCK_RENEWALS: &str = "datastore_lock_renewals_total";
    pub const LOCK_RELEASES: &str = "datastore_lock_releases_total";
    pub const LOCK_RECLAIMS: &str = "datastore_lock_reclaims_total";
    pub const HEARTBEAT_FAILURES: &str = "datastore_heartbeat_failures_total";

    pub const HTTP_REQUESTS: &str = "http_requests_total";
    pub const HTTP_REQUEST_DURATION: &str = "http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "http_requests_in_flight";
}

/// Initialize the Prometheus metrics exporter
///
/// This starts an HTTP listener on the specified port that exposes metrics
/// at the `/metrics` endpoint. Call it before serving traffic; anything
/// recorded earlier is dropped.
///
/// # Example
///
/// ```ignore
/// observability::metrics::init_metrics(9100)?;
/// // Metrics available at http://localhost:9100/metrics
/// ```
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    tracing::info!(%addr, "Metrics server listening");
    Ok(())
}

/// Outcome of a lock acquisition attempt, used as a metric label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Granted,
    Held,
    Contended,
    Failed,
}

impl AcquireOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcquireOutcome::Granted => "granted",
            AcquireOutcome::Held => "held",
            AcquireOutcome::Contended => "contended",
            AcquireOutcome::Failed => "failed",
        }
    }
}

/// Write-lock coordination metrics
///
/// # Metrics
///
/// * `datastore_lock_acquisitions_total{outcome}` - Acquire attempts by outcome
/// * `datastore_lock_acquire_duration_seconds` - Time spent inside acquire
/// * `datastore_lock_cas_conflicts_total` - Compare-and-swap attempts that lost a race
/// * `datastore_lock_renewals_total` - Successful lease renewals
/// * `datastore_lock_releases_total` - Releases that cleared the holder
/// * `datastore_lock_reclaims_total` - Grants taken over from an expired holder
/// * `datastore_heartbeat_failures_total` - Instance heartbeats that failed
#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinationMetrics;

impl CoordinationMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Record a finished acquire call
    pub fn record_acquire(&self, outcome: AcquireOutcome, duration: Duration) {
        counter!(names::LOCK_ACQUISITIONS, "outcome" => outcome.as_str()).increment(1);
        histogram!(names::LOCK_ACQUIRE_DURATION).record(duration.as_secs_f64());
    }

    pub fn cas_conflict(&self) {
        counter!(names::LOCK_CAS_CONFLICTS).increment(1);
    }

    pub fn renewed(&self) {
        counter!(names::LOCK_RENEWALS).increment(1);
    }

    pub fn released(&self) {
        counter!(names::LOCK_RELEASES).increment(1);
    }

    /// A grant replaced a holder whose lease had expired
    pub fn reclaimed(&self) {
        counter!(names::LOCK_RECLAIMS).increment(1);
    }

    pub fn heartbeat_failed(&self) {
        counter!(names::HEARTBEAT_FAILURES).increment(1);
    }
}

/// HTTP request metrics, labelled by server name
///
/// # Metrics
///
/// * `http_requests_total{server, status}` - Completed requests
/// * `http_request_duration_seconds{server}` - Request duration histogram
/// * `http_requests_in_flight{server}` - Requests currently being handled
#[derive(Debug, Clone)]
pub struct ServerMetrics {
    server_name: String,
}

impl ServerMetrics {
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
        }
    }

    /// Record a completed request
    pub fn record_request(&self, duration: Duration, status_code: u16) {
        counter!(
            names::HTTP_REQUESTS,
            "server" => self.server_name.clone(),
            "status" => status_code.to_string()
        )
        .increment(1);
        histogram!(names::HTTP_REQUEST_DURATION, "server" => self.server_name.clone())
            .record(duration.as_secs_f64());
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    fn adjust_in_flight(&self, delta: f64) {
        gauge!(names::HTTP_REQUESTS_IN_FLIGHT, "server" => self.server_name.clone())
            .increment(delta);

    }
}

/// Counts a request as in flight until dropped, then records its duration
/// and status
pub struct RequestMetricsGuard<'a> {
    metrics: &'a ServerMetrics,
    start: Instant,
    status_code: u16,
}

impl<'a> RequestMetricsGuard<'a> {
    pub fn new(metrics: &'a ServerMetrics) -> Self {
        metrics.adjust_in_flight(1.0);
        Self {
            metrics,
            start: Instant::now(),
            status_code: 200,
        }
    }

    /// Set the status code (call before drop)
    pub fn set_status(&mut self, code: u16) {
        self.status_code = code;
    }
}

impl Drop for RequestMetricsGuard<'_> {
    fn drop(&mut self) {
        self.metrics.adjust_in_flight(-1.0);
        self.metrics.record_request(self.start.elapsed(), self.status_code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

    fn counter_value(snapshotter: &Snapshotter, name: &str) -> u64 {
        snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .filter(|(key, _, _, _)| key.key().name() == name)
            .map(|(_, _, _, value)| match value {
                DebugValue::Counter(n) => n,
                _ => 0,
            })
            .sum()
    }

    #[test]
    fn test_coordination_metrics_built_before_recorder() {
        let metrics = CoordinationMetrics::new();

        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        ::metrics::with_local_recorder(&recorder, || {
            metrics.renewed();
            metrics.released();
            metrics.cas_conflict();
            metrics.cas_conflict();
            metrics.record_acquire(AcquireOutcome::Granted, Duration::from_millis(3));
        });

        assert_eq!(counter_value(&snapshotter, names::LOCK_RENEWALS), 1);
        assert_eq!(counter_value(&snapshotter, names::LOCK_RELEASES), 1);
        assert_eq!(counter_value(&snapshotter, names::LOCK_CAS_CONFLICTS), 2);
        assert_eq!(counter_value(&snapshotter, names::LOCK_ACQUISITIONS), 1);
    }

    #[test]
    fn test_request_guard_records_on_drop() {
        let metrics = ServerMetrics::new("http");
        assert_eq!(metrics.server_name(), "http");

        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        ::metrics::with_local_recorder(&recorder, || {
            let mut guard = RequestMetricsGuard::new(&metrics);
            guard.set_status(409);
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let requests = snapshot
            .iter()
            .find(|(key, _, _, _)| key.key().name() == names::HTTP_REQUESTS)
            .expect("request counter recorded");
        assert!(requests
            .0
            .key()
            .labels()
            .any(|label| label.key() == "status" && label.value() == "409"));
        assert!(matches!(requests.3, DebugValue::Counter(1)));

        let durations = snapshot
            .iter()
            .find(|(key, _, _, _)| key.key().name() == names::HTTP_REQUEST_DURATION)
            .expect("duration recorded");
        assert!(matches!(&durations.3, DebugValue::Histogram(values) if values.len() == 1));
    }

    #[test]
    fn test_acquire_outcome_labels() {
        assert_eq!(AcquireOutcome::Granted.as_str(), "granted");
        assert_eq!(AcquireOutcome::Contended.as_str(), "contended");
    }
}
