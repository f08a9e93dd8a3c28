//! Prometheus exporter.

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};
use std::net::SocketAddr;

const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

/// Install the global recorder and serve `/metrics` on `addr`.
///
/// Must be called from within the Tokio runtime.
///
/// # Errors
///
/// Returns the exporter error if a recorder is already installed or the
/// listener cannot be built.
pub fn install(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(Matcher::Suffix("duration_seconds".to_string()), LATENCY_BUCKETS)?
        .install()?;
    describe();
    tracing::info!(%addr, "Metrics exporter listening");
    Ok(())
}

fn describe() {
    describe_counter!("readmodels_events_handled_total", "Events projected successfully, by event type");
    describe_counter!("readmodels_events_dropped_total", "Events dropped by their handler, by event type");
    describe_counter!("readmodels_events_ignored_total", "Events with no registered handler");
    describe_counter!("readmodels_group_rebalances_total", "Partition assignments received by the consumer group");
    describe_counter!("readmodels_cache_hits_total", "Page cache hits, by list kind");
    describe_counter!("readmodels_cache_misses_total", "Page cache misses, by list kind");
    describe_counter!("readmodels_http_requests_total", "Read API responses, by status");
    describe_histogram!("readmodels_http_request_duration_seconds", "Read API request latency");
}
