//! Prometheus metrics for the Decoy server.
//!
//! Tracks dispatch outcomes, injected latency, validation failures, template
//! degradation and webhook delivery.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram, register_histogram_vec, register_int_counter,
    register_int_gauge, CounterVec, Encoder, Histogram, HistogramVec, IntCounter, IntGauge,
    TextEncoder,
};
use std::time::Duration;

lazy_static! {
    /// Total number of dispatched requests
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "decoy_requests_total",
        "Total number of requests dispatched to mock endpoints",
        &["project", "status", "matched"]
    )
    .unwrap();

    /// Dispatch duration, including injected delay
    pub static ref DISPATCH_DURATION_MS: HistogramVec = register_histogram_vec!(
        "decoy_dispatch_duration_ms",
        "Histogram of end-to-end dispatch time in milliseconds",
        &["project", "matched"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap();

    /// Injected latency in milliseconds
    pub static ref DELAY_INJECTED_MS: Histogram = register_histogram!(
        "decoy_delay_injected_ms",
        "Histogram of simulated latency in milliseconds",
        vec![10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    )
    .unwrap();

    /// Requests rejected by a validation rule
    pub static ref VALIDATION_FAILURES_TOTAL: CounterVec = register_counter_vec!(
        "decoy_validation_failures_total",
        "Total number of requests rejected by validation rules",
        &["project", "endpoint", "reason"]
    )
    .unwrap();

    /// Placeholders left verbatim because nothing resolved them
    pub static ref TEMPLATE_DEGRADED_TOTAL: IntCounter = register_int_counter!(
        "decoy_template_unresolved_total",
        "Total number of template placeholders that could not be resolved"
    )
    .unwrap();

    /// Webhook deliveries by outcome
    pub static ref WEBHOOK_DELIVERIES_TOTAL: CounterVec = register_counter_vec!(
        "decoy_webhook_deliveries_total",
        "Total number of webhook delivery attempts",
        &["outcome"]  // outcome: delivered|rejected|failed
    )
    .unwrap();

    /// Webhook jobs dropped because the queue was full
    pub static ref WEBHOOK_DROPPED_TOTAL: IntCounter = register_int_counter!(
        "decoy_webhook_dropped_total",
        "Total number of webhook jobs dropped on a full queue"
    )
    .unwrap();

    /// Webhook jobs waiting for a worker
    pub static ref WEBHOOK_QUEUE_DEPTH: IntGauge = register_int_gauge!(
        "decoy_webhook_queue_depth",
        "Number of webhook jobs waiting for a worker"
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Helper to record one dispatch
pub fn record_request(project: &str, status: u16, matched: bool, duration: Duration) {
    let matched = if matched { "true" } else { "false" };
    REQUESTS_TOTAL
        .with_label_values(&[project, &status.to_string(), matched])
        .inc();
    DISPATCH_DURATION_MS
        .with_label_values(&[project, matched])
        .observe(duration.as_secs_f64() * 1000.0);
}

pub fn record_injected_delay(delay: Duration) {
    DELAY_INJECTED_MS.observe(delay.as_millis() as f64);
}

pub fn record_validation_failure(project: &str, endpoint: &str, reason: &str) {
    VALIDATION_FAILURES_TOTAL
        .with_label_values(&[project, endpoint, reason])
        .inc();
}

pub fn record_template_degraded() {
    TEMPLATE_DEGRADED_TOTAL.inc();
}

pub fn record_webhook_delivery(outcome: &str) {
    WEBHOOK_DELIVERIES_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_webhook_dropped() {
    WEBHOOK_DROPPED_TOTAL.inc();
}
